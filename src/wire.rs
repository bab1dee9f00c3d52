//! Bounds-checked helpers over raw DNS messages.

pub const HEADER_LEN: usize = 12;
pub const CLASS_IN: u16 = 1;
pub const TYPE_TXT: u16 = 16;
pub const TYPE_OPT: u16 = 41;
pub const TYPE_ANY: u16 = 255;

pub fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let b = buf.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

/// Returns the offset just past the name starting at `offset`.
/// A compression pointer ends the name; it is not followed.
pub fn skip_name(buf: &[u8], mut offset: usize) -> Option<usize> {
    loop {
        let len = *buf.get(offset)? as usize;
        match len & 0xC0 {
            0x00 if len == 0 => return Some(offset + 1),
            0x00 => offset += len + 1,
            0xC0 => return buf.get(offset + 1).map(|_| offset + 2),
            _ => return None,
        }
    }
}

/// Returns the offset just past the resource record starting at `offset`.
pub fn skip_record(buf: &[u8], offset: usize) -> Option<usize> {
    let name_end = skip_name(buf, offset)?;
    let rdlen = read_u16(buf, name_end + 8)? as usize;
    let end = name_end + 10 + rdlen;
    if end > buf.len() { return None; }
    Some(end)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Lowercased, dot terminated (`example.com.`).
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
    /// Offset just past the question in the message.
    pub end: usize,
}

/// Parses the first question of a query. Compressed names are rejected.
pub fn parse_question(buf: &[u8]) -> Option<Question> {
    if read_u16(buf, 4)? == 0 { return None; }

    let mut offset = HEADER_LEN;
    let mut name = String::new();
    loop {
        let len = *buf.get(offset)? as usize;
        offset += 1;
        if len == 0 { break; }
        if len & 0xC0 != 0 { return None; }
        let label = buf.get(offset..offset + len)?;
        name.extend(label.iter().map(|b| b.to_ascii_lowercase() as char));
        name.push('.');
        offset += len;
    }
    if name.is_empty() { name.push('.'); }

    let qtype = read_u16(buf, offset)?;
    let qclass = read_u16(buf, offset + 2)?;
    Some(Question { name, qtype, qclass, end: offset + 4 })
}

/// Builds an authoritative NOERROR answer to `query` holding a single TXT
/// record with TTL 0. `text` is split into 255-byte character-strings.
pub fn build_txt_response(query: &[u8], question: &Question, text: &str) -> Vec<u8> {
    let mut rdata = Vec::with_capacity(text.len() + text.len() / 255 + 1);
    for chunk in text.as_bytes().chunks(255) {
        rdata.push(chunk.len() as u8);
        rdata.extend_from_slice(chunk);
    }
    if rdata.is_empty() { rdata.push(0); }

    let mut resp = Vec::with_capacity(question.end + 12 + rdata.len());
    resp.extend_from_slice(&query[0..2]);
    // QR + AA, keep OPCODE and RD from the query
    resp.push(0x84 | (query[2] & 0x79));
    resp.push(0x00);
    resp.extend_from_slice(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    resp.extend_from_slice(&query[HEADER_LEN..question.end]);

    resp.extend_from_slice(&[0xC0, 0x0C]);
    resp.extend_from_slice(&TYPE_TXT.to_be_bytes());
    resp.extend_from_slice(&CLASS_IN.to_be_bytes());
    resp.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    resp.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    resp.extend_from_slice(&rdata);
    resp
}

/// Cuts a response down to header and question with TC set, so a client can
/// retry over TCP. Answer, authority and additional counts become zero.
pub fn truncate_response(resp: &[u8]) -> Vec<u8> {
    let question_end = parse_question(resp).map(|q| q.end);
    let mut out = Vec::with_capacity(question_end.unwrap_or(HEADER_LEN));
    out.extend_from_slice(&resp[..HEADER_LEN.min(resp.len())]);
    out.resize(HEADER_LEN, 0);
    out[2] |= 0x02;
    let qdcount: u16 = if question_end.is_some() { 1 } else { 0 };
    out[4..6].copy_from_slice(&qdcount.to_be_bytes());
    out[6..HEADER_LEN].fill(0);
    if let Some(end) = question_end {
        out.extend_from_slice(&resp[HEADER_LEN..end]);
    }
    out
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_parse_question() {
        let query = build_query(7, "DebugInfo.Example.", TYPE_TXT, None);
        let q = parse_question(&query).unwrap();
        assert_eq!(q.name, "debuginfo.example.");
        assert_eq!(q.qtype, TYPE_TXT);
        assert_eq!(q.qclass, CLASS_IN);
        assert_eq!(q.end, query.len());
    }

    #[test]
    fn test_parse_question_root_and_truncated() {
        let query = build_query(7, ".", TYPE_ANY, None);
        assert_eq!(parse_question(&query).unwrap().name, ".");

        assert!(parse_question(&query[..query.len() - 1]).is_none());
        assert!(parse_question(&query[..HEADER_LEN]).is_none());
    }

    #[test]
    fn test_skip_name_with_pointer() {
        let buf = [3, b'w', b'w', b'w', 0xC0, 0x0C, 0xFF];
        assert_eq!(skip_name(&buf, 0), Some(6));
        assert_eq!(skip_name(&buf[..5], 0), None);
        assert_eq!(skip_name(&[0x40], 0), None);
    }

    #[test]
    fn test_txt_response_splits_long_text() {
        let query = build_query(0xBEEF, "debuginfo.", TYPE_TXT, None);
        let question = parse_question(&query).unwrap();
        let text = "x".repeat(300);

        let resp = build_txt_response(&query, &question, &text);
        assert_eq!(&resp[0..2], &[0xBE, 0xEF]);
        assert_eq!(resp[2] & 0x80, 0x80);
        assert_eq!(resp[2] & 0x04, 0x04);
        assert_eq!(resp[2] & 0x01, 0x01);
        assert_eq!(resp[3] & 0x0F, 0);
        assert_eq!(read_u16(&resp, 6), Some(1));
        assert_eq!(resp[question.end + 12], 255);
        assert_eq!(txt_answer(&resp), text);
    }

    #[test]
    fn test_truncate_keeps_header_and_question() {
        let query = build_query(0xBEEF, "debuginfo.", TYPE_TXT, None);
        let question = parse_question(&query).unwrap();
        let resp = build_txt_response(&query, &question, &"y".repeat(2000));

        let cut = truncate_response(&resp);
        assert_eq!(cut.len(), question.end);
        assert_eq!(&cut[0..2], &[0xBE, 0xEF]);
        assert_eq!(cut[2] & 0x02, 0x02);
        assert_eq!(cut[2] & 0x84, 0x84);
        assert_eq!(read_u16(&cut, 4), Some(1));
        assert_eq!(read_u16(&cut, 6), Some(0));
        assert_eq!(read_u16(&cut, 8), Some(0));
        assert_eq!(read_u16(&cut, 10), Some(0));
        assert_eq!(parse_question(&cut), Some(question));
    }

    #[test]
    fn test_truncate_without_question() {
        let cut = truncate_response(&[0x12, 0x34, 0x80, 0x00, 0x00, 0x00]);
        assert_eq!(cut, vec![0x12, 0x34, 0x82, 0x00, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_txt_response_empty_text() {
        let query = build_query(1, "debuginfo.", TYPE_TXT, None);
        let question = parse_question(&query).unwrap();
        let resp = build_txt_response(&query, &question, "");
        assert_eq!(read_u16(&resp, question.end + 10), Some(1));
        assert_eq!(txt_answer(&resp), "");
    }
}
