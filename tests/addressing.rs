use crsd_rs::blocks::addressing::{ChannelShape, SignalAddressing, SupportAddressing, SupportArrayShape};
use crsd_rs::error::CrsdError;

fn two_channels() -> Result<SignalAddressing, CrsdError> {
    SignalAddressing::new(4096, 4, vec![ChannelShape::new(3, 8), ChannelShape::new(5, 4)])
}

#[test]
fn offsets_follow_channel_vector_sample_order() -> Result<(), CrsdError> {
    let signal = two_channels()?;
    assert_eq!(signal.file_offset(0, 0, 0)?, 4096);
    assert_eq!(signal.file_offset(0, 0, 1)?, 4100);
    assert_eq!(signal.file_offset(0, 1, 0)?, 4096 + 32);
    assert_eq!(signal.file_offset(0, 2, 7)?, 4096 + 2 * 32 + 7 * 4);
    assert_eq!(signal.file_offset(1, 0, 0)?, 4096 + 96);
    assert_eq!(signal.file_offset(1, 4, 3)?, 4096 + 96 + 4 * 16 + 3 * 4);
    assert_eq!(signal.block_size(), 96 + 80);
    Ok(())
}

#[test]
fn offsets_increase_strictly_and_channels_do_not_overlap() -> Result<(), CrsdError> {
    let signal = SignalAddressing::new(
        0,
        8,
        vec![ChannelShape::new(2, 3), ChannelShape::new(0, 9), ChannelShape::new(4, 1)],
    )?;
    let mut previous = None;
    for channel in 0..signal.num_channels() {
        let shape = *signal.shape(channel)?;
        let start = signal.channel_offset(channel)?;
        let end = start + signal.channel_size(channel)?;
        for v in 0..shape.num_vectors {
            for s in 0..shape.num_samples {
                let offset = signal.file_offset(channel, v, s)?;
                assert!(offset >= start && offset + 8 <= end);
                if let Some(p) = previous {
                    assert!(offset > p);
                }
                previous = Some(offset);
            }
        }
    }
    assert_eq!(signal.channel_offset(2)?, 48);
    Ok(())
}

#[test]
fn indices_past_the_shape_are_errors() -> Result<(), CrsdError> {
    let signal = two_channels()?;
    assert!(matches!(
        signal.file_offset(2, 0, 0),
        Err(CrsdError::OutOfRange { what: "channel", index: 2, limit: 2 })
    ));
    assert!(matches!(
        signal.file_offset(0, 3, 0),
        Err(CrsdError::OutOfRange { what: "vector", index: 3, limit: 3 })
    ));
    assert!(matches!(
        signal.file_offset(1, 0, 4),
        Err(CrsdError::OutOfRange { what: "sample", index: 4, limit: 4 })
    ));
    Ok(())
}

#[test]
fn compressed_channels_have_no_sample_addresses() -> Result<(), CrsdError> {
    let mut first = ChannelShape::new(3, 8);
    first.compressed_size = Some(50);
    let signal = SignalAddressing::new(100, 4, vec![first, ChannelShape::new(5, 4)])?;

    assert!(signal.is_compressed(0)?);
    assert!(!signal.is_compressed(1)?);
    assert!(matches!(
        signal.file_offset(0, 0, 0),
        Err(CrsdError::CompressedAddressing { channel: 0 })
    ));
    assert!(matches!(signal.vector_size(0), Err(CrsdError::CompressedAddressing { .. })));

    // The next channel starts right after the compressed bytes.
    assert_eq!(signal.channel_size(0)?, 50);
    assert_eq!(signal.file_offset(1, 0, 0)?, 150);
    assert_eq!(signal.block_size(), 50 + 80);
    Ok(())
}

#[test]
fn support_arrays_are_row_major() -> Result<(), CrsdError> {
    let support = SupportAddressing::new(
        2000,
        vec![
            SupportArrayShape {
                id: "GAIN".to_string(),
                num_rows: 2,
                num_cols: 3,
                bytes_per_element: 8,
                array_byte_offset: 0,
            },
            SupportArrayShape {
                id: "NOISE".to_string(),
                num_rows: 4,
                num_cols: 1,
                bytes_per_element: 4,
                array_byte_offset: 48,
            },
        ],
    )?;
    assert_eq!(support.element_offset("GAIN", 0, 0)?, 2000);
    assert_eq!(support.element_offset("GAIN", 0, 2)?, 2016);
    assert_eq!(support.element_offset("GAIN", 1, 0)?, 2024);
    assert_eq!(support.element_offset("NOISE", 3, 0)?, 2048 + 12);
    assert_eq!(support.array_range("NOISE")?, (2048, 16));
    assert_eq!(support.required_size(), 64);

    assert!(matches!(
        support.element_offset("GAIN", 2, 0),
        Err(CrsdError::OutOfRange { what: "row", .. })
    ));
    assert!(matches!(
        support.element_offset("GAIN", 0, 3),
        Err(CrsdError::OutOfRange { what: "column", .. })
    ));
    match support.array("PHASE") {
        Err(CrsdError::UnknownSupportArray(id)) => assert_eq!(id, "PHASE"),
        other => panic!("expected UnknownSupportArray, got {other:?}"),
    }
    Ok(())
}

#[test]
fn channel_sizes_past_u64_are_rejected() {
    let huge = ChannelShape::new(4, usize::MAX / 2);
    assert!(matches!(
        SignalAddressing::new(0, 8, vec![huge]),
        Err(CrsdError::Metadata(_))
    ));

    // Each channel fits, their sum does not.
    let mut first = ChannelShape::new(1, 1);
    first.compressed_size = Some(u64::MAX - 4);
    assert!(matches!(
        SignalAddressing::new(0, 4, vec![first, ChannelShape::new(1, 2)]),
        Err(CrsdError::Metadata(_))
    ));

    // The block fits, its end past the base offset does not.
    assert!(matches!(
        SignalAddressing::new(u64::MAX - 8, 4, vec![ChannelShape::new(2, 2)]),
        Err(CrsdError::Metadata(_))
    ));
}

#[test]
fn empty_channel_with_huge_vectors_has_no_vector_size() -> Result<(), CrsdError> {
    let signal = SignalAddressing::new(0, 8, vec![ChannelShape::new(0, usize::MAX)])?;
    assert_eq!(signal.block_size(), 0);
    assert!(matches!(signal.vector_size(0), Err(CrsdError::Metadata(_))));
    Ok(())
}

#[test]
fn support_arrays_past_u64_are_rejected() {
    let oversized = SupportArrayShape {
        id: "GAIN".to_string(),
        num_rows: usize::MAX / 2,
        num_cols: 4,
        bytes_per_element: 8,
        array_byte_offset: 0,
    };
    assert!(matches!(oversized.size_bytes(), Err(CrsdError::Metadata(_))));
    assert!(matches!(
        SupportAddressing::new(0, vec![oversized]),
        Err(CrsdError::Metadata(_))
    ));

    let far = SupportArrayShape {
        id: "NOISE".to_string(),
        num_rows: 2,
        num_cols: 2,
        bytes_per_element: 4,
        array_byte_offset: u64::MAX - 8,
    };
    assert!(matches!(
        SupportAddressing::new(0, vec![far.clone()]),
        Err(CrsdError::Metadata(_))
    ));
    let near = SupportArrayShape { array_byte_offset: 16, ..far };
    assert!(matches!(
        SupportAddressing::new(u64::MAX - 20, vec![near]),
        Err(CrsdError::Metadata(_))
    ));
}
