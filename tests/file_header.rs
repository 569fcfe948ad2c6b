use std::io::Cursor;

use crsd_rs::blocks::file_header::{BlockLocation, CrsdType, FileHeader, MAX_HEADER_SIZE};
use crsd_rs::error::CrsdError;

const SAR_HEADER: &str = "CRSDsar/1.0\n\
XML_BLOCK_SIZE := 100\n\
XML_BLOCK_BYTE_OFFSET := 400\n\
PPP_BLOCK_SIZE := 64\n\
PPP_BLOCK_BYTE_OFFSET := 504\n\
PVP_BLOCK_SIZE := 64\n\
PVP_BLOCK_BYTE_OFFSET := 568\n\
SIGNAL_BLOCK_SIZE := 128\n\
SIGNAL_BLOCK_BYTE_OFFSET := 632\n\
CLASSIFICATION := UNCLASSIFIED\n\
RELEASE_INFO := UNRESTRICTED\n";

fn file_bytes(header: &str, tail: &[u8]) -> Cursor<Vec<u8>> {
    let mut bytes = header.as_bytes().to_vec();
    bytes.extend_from_slice(tail);
    Cursor::new(bytes)
}

#[test]
fn reads_sar_header() -> Result<(), CrsdError> {
    let mut stream = file_bytes(SAR_HEADER, b"\x0c\n<xml/>");
    let header = FileHeader::read(&mut stream, 64)?;

    assert_eq!(header.crsd_type, CrsdType::Sar);
    assert_eq!(header.version, "1.0");
    assert_eq!(header.xml, BlockLocation::new(100, 400));
    assert_eq!(header.ppp, Some(BlockLocation::new(64, 504)));
    assert_eq!(header.pvp, Some(BlockLocation::new(64, 568)));
    assert_eq!(header.signal, Some(BlockLocation::new(128, 632)));
    assert_eq!(header.support, None);
    assert_eq!(header.classification, "UNCLASSIFIED");
    assert_eq!(header.release_info, "UNRESTRICTED");

    assert_eq!(FileHeader::read_version(&mut stream)?, "1.0");
    assert_eq!(FileHeader::read_type(&mut stream)?, CrsdType::Sar);
    Ok(())
}

#[test]
fn read_leaves_stream_after_terminator() -> Result<(), CrsdError> {
    use std::io::Read;

    let mut stream = file_bytes(SAR_HEADER, b"\x0c\n<xml/>");
    FileHeader::read(&mut stream, 16)?;
    let mut rest = String::new();
    stream.read_to_string(&mut rest)?;
    assert_eq!(rest, "<xml/>");
    Ok(())
}

#[test]
fn serialization_is_exact_inverse_of_read() -> Result<(), CrsdError> {
    let mut stream = file_bytes(SAR_HEADER, b"\x0c\n");
    let header = FileHeader::read(&mut stream, 1024)?;
    assert_eq!(header.to_string(), SAR_HEADER);
    assert_eq!(FileHeader::parse(&header.to_string())?, header);
    Ok(())
}

#[test]
fn additional_keys_survive_round_trip() -> Result<(), CrsdError> {
    let text = format!("{SAR_HEADER}COLLECTOR := TEST-1\nNOTE := a := b\n");
    let header = FileHeader::parse(&text)?;
    assert_eq!(
        header.additional,
        vec![
            ("COLLECTOR".to_string(), "TEST-1".to_string()),
            ("NOTE".to_string(), "a := b".to_string()),
        ]
    );
    assert_eq!(header.to_string(), text);
    Ok(())
}

#[test]
fn terminator_on_block_boundary() -> Result<(), CrsdError> {
    // The terminator is the last byte of the first block.
    let block_size = SAR_HEADER.len() + 1;

    let mut ok = file_bytes(SAR_HEADER, b"\x0c\nrest");
    let header = FileHeader::read(&mut ok, block_size)?;
    assert_eq!(header.crsd_type, CrsdType::Sar);

    let mut bad = file_bytes(SAR_HEADER, b"\x0cXrest");
    assert!(matches!(
        FileHeader::read(&mut bad, block_size),
        Err(CrsdError::MalformedHeader(_))
    ));

    let mut ends = file_bytes(SAR_HEADER, b"\x0c");
    assert!(matches!(
        FileHeader::read(&mut ends, block_size),
        Err(CrsdError::MalformedHeader(_))
    ));
    Ok(())
}

#[test]
fn tiny_blocks_still_find_terminator() -> Result<(), CrsdError> {
    for block_size in [1, 2, 3, 7, 13] {
        let mut stream = file_bytes(SAR_HEADER, b"\x0c\n");
        let header = FileHeader::read(&mut stream, block_size)?;
        assert_eq!(header.to_string(), SAR_HEADER);
    }
    Ok(())
}

#[test]
fn truncated_before_terminator_is_malformed() {
    let cut = &SAR_HEADER[..SAR_HEADER.len() - 10];
    let mut stream = file_bytes(cut, b"");
    assert!(matches!(
        FileHeader::read(&mut stream, 32),
        Err(CrsdError::MalformedHeader(_))
    ));
}

#[test]
fn header_over_size_ceiling_is_malformed() {
    let mut bytes = SAR_HEADER.as_bytes().to_vec();
    bytes.resize(MAX_HEADER_SIZE as usize + 4096, b'A');
    bytes.extend_from_slice(b"\x0c\n");
    let mut stream = Cursor::new(bytes);
    assert!(matches!(
        FileHeader::read(&mut stream, 1024 * 1024),
        Err(CrsdError::MalformedHeader(_))
    ));
}

#[test]
fn unknown_type_is_not_crsd() {
    let text = SAR_HEADER.replace("CRSDsar/1.0", "CPHD/1.1.0");
    let mut stream = file_bytes(&text, b"\x0c\n");
    assert!(matches!(FileHeader::read(&mut stream, 256), Err(CrsdError::NotCrsd(_))));
    assert!(matches!(FileHeader::read_version(&mut stream), Err(CrsdError::NotCrsd(_))));

    let mut no_slash = file_bytes("CRSDsar 1.0\n", b"\x0c\n");
    assert!(matches!(FileHeader::read_type(&mut no_slash), Err(CrsdError::NotCrsd(_))));
}

#[test]
fn version_is_trimmed() -> Result<(), CrsdError> {
    let mut stream = file_bytes("CRSDrcv/ 1.0.0  \r\nXML_BLOCK_SIZE := 1\n", b"");
    assert_eq!(FileHeader::read_version(&mut stream)?, "1.0.0");
    assert_eq!(FileHeader::read_type(&mut stream)?, CrsdType::Rcv);
    Ok(())
}

#[test]
fn classifies_leading_tokens() -> Result<(), CrsdError> {
    assert!(FileHeader::is_crsd(&mut Cursor::new(b"CRSDsar/1.0".to_vec()))?);
    assert!(FileHeader::is_crsd(&mut Cursor::new(b"CRSDrcv/1.0".to_vec()))?);
    assert!(FileHeader::is_crsd(&mut Cursor::new(b"CRSDtx/1.0".to_vec()))?);
    assert!(!FileHeader::is_crsd(&mut Cursor::new(b"CPHD/1.0.1".to_vec()))?);
    assert!(!FileHeader::is_crsd(&mut Cursor::new(b"CRSDsa".to_vec()))?);
    assert!(!FileHeader::is_crsd(&mut Cursor::new(Vec::new()))?);
    Ok(())
}

#[test]
fn missing_and_empty_required_fields() {
    let missing = SAR_HEADER.replace("CLASSIFICATION := UNCLASSIFIED\n", "");
    match FileHeader::parse(&missing) {
        Err(CrsdError::MissingField { key, reason }) => {
            assert_eq!(key, "CLASSIFICATION");
            assert_eq!(reason, "missing");
        }
        other => panic!("expected MissingField, got {other:?}"),
    }

    let empty = SAR_HEADER.replace("RELEASE_INFO := UNRESTRICTED", "RELEASE_INFO := ");
    match FileHeader::parse(&empty) {
        Err(CrsdError::MissingField { key, reason }) => {
            assert_eq!(key, "RELEASE_INFO");
            assert_eq!(reason, "empty");
        }
        other => panic!("expected MissingField, got {other:?}"),
    }

    let no_pvp = SAR_HEADER.replace("PVP_BLOCK_SIZE := 64\n", "");
    assert!(matches!(FileHeader::parse(&no_pvp), Err(CrsdError::MissingField { .. })));
}

#[test]
fn rejects_bad_lines() {
    let not_numeric = SAR_HEADER.replace("XML_BLOCK_SIZE := 100", "XML_BLOCK_SIZE := lots");
    assert!(matches!(FileHeader::parse(&not_numeric), Err(CrsdError::MalformedHeader(_))));

    let no_delimiter = format!("{SAR_HEADER}JUNK\n");
    assert!(matches!(FileHeader::parse(&no_delimiter), Err(CrsdError::MalformedHeader(_))));

    let duplicate = format!("{SAR_HEADER}CLASSIFICATION := SECRET\n");
    assert!(matches!(FileHeader::parse(&duplicate), Err(CrsdError::MalformedHeader(_))));
}

#[test]
fn block_keys_follow_product_type() -> Result<(), CrsdError> {
    let tx = "CRSDtx/1.0\n\
XML_BLOCK_SIZE := 10\n\
XML_BLOCK_BYTE_OFFSET := 200\n\
PPP_BLOCK_SIZE := 16\n\
PPP_BLOCK_BYTE_OFFSET := 216\n\
CLASSIFICATION := U\n\
RELEASE_INFO := R\n";
    let header = FileHeader::parse(tx)?;
    assert_eq!(header.crsd_type, CrsdType::Tx);
    assert!(header.pvp.is_none() && header.signal.is_none());
    assert_eq!(header.to_string(), tx);

    let with_pvp = format!("{tx}PVP_BLOCK_SIZE := 8\nPVP_BLOCK_BYTE_OFFSET := 240\n");
    assert!(matches!(FileHeader::parse(&with_pvp), Err(CrsdError::MalformedHeader(_))));
    Ok(())
}

#[test]
fn set_block_sizes_lays_out_blocks() -> Result<(), CrsdError> {
    let mut header = FileHeader::new(CrsdType::Sar, "1.0.0", "UNCLASSIFIED", "UNRESTRICTED");
    header.set_block_sizes(1234, 100, 480, 960, 123_456)?;

    let header_len = header.to_string().len() as u64;
    assert_eq!(header.xml.byte_offset, header_len + 2);
    assert_eq!(header.size_with_terminator(), header.xml.byte_offset);

    let support = header.support.unwrap();
    let ppp = header.ppp.unwrap();
    let pvp = header.pvp.unwrap();
    let signal = header.signal.unwrap();
    assert!(support.byte_offset >= header.xml.end()? + 2);
    for (prev, next) in [(support, ppp), (ppp, pvp), (pvp, signal)] {
        assert_eq!(next.byte_offset % 8, 0);
        assert!(next.byte_offset >= prev.end()?);
        assert!(next.byte_offset - prev.end()? < 8);
    }
    assert_eq!(signal.size, 123_456);

    // The computed header parses back to itself.
    assert_eq!(FileHeader::parse(&header.to_string())?, header);
    Ok(())
}

#[test]
fn set_block_sizes_rejects_sizes_past_u64() {
    let mut header = FileHeader::new(CrsdType::Sar, "1.0.0", "U", "R");
    assert!(matches!(
        header.set_block_sizes(10, 0, 64, 64, u64::MAX),
        Err(CrsdError::Serialization(_))
    ));

    let mut header = FileHeader::new(CrsdType::Rcv, "1.0.0", "U", "R");
    assert!(matches!(
        header.set_block_sizes(u64::MAX - 8, 0, 0, 16, 32),
        Err(CrsdError::Serialization(_))
    ));
}

#[test]
fn block_ends_past_u64_are_malformed() {
    let location = BlockLocation::new(16, u64::MAX - 8);
    assert!(matches!(location.end(), Err(CrsdError::MalformedHeader(_))));
    assert!(matches!(BlockLocation::new(8, u64::MAX - 8).end(), Ok(u64::MAX)));

    let far_xml = SAR_HEADER.replace("XML_BLOCK_BYTE_OFFSET := 400", "XML_BLOCK_BYTE_OFFSET := 18446744073709551610");
    assert!(matches!(FileHeader::parse(&far_xml), Err(CrsdError::MalformedHeader(_))));

    let huge_signal = SAR_HEADER.replace("SIGNAL_BLOCK_SIZE := 128", "SIGNAL_BLOCK_SIZE := 18446744073709551615");
    assert!(matches!(FileHeader::parse(&huge_signal), Err(CrsdError::MalformedHeader(_))));
}

#[test]
fn oversized_read_chunk_is_capped() -> Result<(), CrsdError> {
    let mut stream = file_bytes(SAR_HEADER, b"\x0c\n<xml/>");
    let header = FileHeader::read(&mut stream, usize::MAX)?;
    assert_eq!(header, FileHeader::parse(SAR_HEADER)?);
    Ok(())
}

#[test]
fn set_block_sizes_rejects_blocks_the_type_lacks() {
    let mut rcv = FileHeader::new(CrsdType::Rcv, "1.0.0", "U", "R");
    assert!(matches!(rcv.set_block_sizes(10, 0, 64, 0, 0), Err(CrsdError::Serialization(_))));

    let mut tx = FileHeader::new(CrsdType::Tx, "1.0.0", "U", "R");
    assert!(matches!(tx.set_block_sizes(10, 0, 0, 0, 64), Err(CrsdError::Serialization(_))));
}

#[test]
fn write_appends_terminator() -> Result<(), CrsdError> {
    let mut header = FileHeader::new(CrsdType::Rcv, "1.0.0", "U", "R");
    header.set_block_sizes(5, 0, 0, 16, 32)?;
    let mut out = Vec::new();
    header.write(&mut out)?;
    assert!(out.ends_with(b"\x0c\n"));

    let parsed = FileHeader::read(&mut Cursor::new(out), 8)?;
    assert_eq!(parsed, header);
    Ok(())
}
