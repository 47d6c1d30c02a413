//! DNS message parsing and construction.

use tracing::warn;

const HEADER_LEN: usize = 12;

/// Largest message a TCP length prefix can describe.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;
/// Largest payload of one TXT character-string.
const MAX_STRING_LEN: usize = 255;

/// Record type code for TXT.
pub const TYPE_TXT: u16 = 16;
/// Class code for the Internet class.
pub const CLASS_IN: u16 = 1;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_RD: u16 = 0x0100;
const OPCODE_MASK: u16 = 0x7800;

/// A parsed DNS query. Only the first question of the message is kept.
#[derive(Debug, Clone)]
pub struct DnsQuery {
    pub id: u16,
    pub flags: u16,
    /// Raw labels of the question name, root label excluded.
    pub labels: Vec<Vec<u8>>,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuery {
    /// Parse a DNS query from raw bytes.
    ///
    /// Returns `None` for truncated messages, messages without a question,
    /// compressed question names and messages that are already responses.
    /// Label bytes are taken as-is.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN + 1 {
            return None;
        }

        let id = u16::from_be_bytes([data[0], data[1]]);
        let flags = u16::from_be_bytes([data[2], data[3]]);
        let qdcount = u16::from_be_bytes([data[4], data[5]]);

        if flags & FLAG_QR != 0 || qdcount == 0 {
            return None;
        }

        // Parse question name
        let mut pos = HEADER_LEN;
        let mut labels = Vec::new();

        loop {
            let label_len = *data.get(pos)? as usize;
            pos += 1;
            if label_len == 0 {
                break;
            }
            // Compression pointers and extended label types never appear in a query name
            if label_len & 0xC0 != 0 || pos + label_len > data.len() {
                return None;
            }
            labels.push(data[pos..pos + label_len].to_vec());
            pos += label_len;
        }

        // Parse QTYPE and QCLASS
        if pos + 4 > data.len() {
            return None;
        }
        let qtype = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let qclass = u16::from_be_bytes([data[pos + 2], data[pos + 3]]);

        Some(Self {
            id,
            flags,
            labels,
            qtype,
            qclass,
        })
    }

    /// Fully-qualified presentation name, escaped, with the trailing root dot.
    pub fn name(&self) -> String {
        presentation_name(&self.labels)
    }

    /// Labels in escaped presentation form.
    pub fn escaped_labels(&self) -> Vec<String> {
        self.labels.iter().map(|l| escape_label(l)).collect()
    }

    pub fn is_txt(&self) -> bool {
        self.qtype == TYPE_TXT
    }

    /// Start an authoritative NOERROR reply echoing this query's question.
    pub fn reply(&self) -> DnsResponse {
        DnsResponse {
            id: self.id,
            flags: FLAG_QR | FLAG_AA | (self.flags & (OPCODE_MASK | FLAG_RD)),
            questions: vec![DnsQuestion {
                labels: self.labels.clone(),
                qtype: self.qtype,
                qclass: self.qclass,
            }],
            answers: Vec::new(),
        }
    }
}

/// Render one label in presentation form.
///
/// Dots, backslashes and other zone-file specials are backslash-escaped;
/// bytes outside printable ASCII become `\DDD`.
pub fn escape_label(label: &[u8]) -> String {
    let mut out = String::with_capacity(label.len());
    for &b in label {
        match b {
            b'.' | b' ' | b'\'' | b'@' | b';' | b'(' | b')' | b'"' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            b' '..=b'~' => out.push(b as char),
            _ => out.push_str(&format!("\\{:03}", b)),
        }
    }
    out
}

/// Join escaped labels into a fully-qualified name.
pub fn presentation_name<L: AsRef<[u8]>>(labels: &[L]) -> String {
    if labels.is_empty() {
        return ".".to_string();
    }
    let mut name = String::new();
    for label in labels {
        name.push_str(&escape_label(label.as_ref()));
        name.push('.');
    }
    name
}

fn wire_len(labels: &[Vec<u8>]) -> usize {
    labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
}

/// Mnemonic for a record type code, for diagnostics.
pub fn type_name(qtype: u16) -> String {
    match qtype {
        1 => "A".to_string(),
        2 => "NS".to_string(),
        5 => "CNAME".to_string(),
        6 => "SOA".to_string(),
        12 => "PTR".to_string(),
        15 => "MX".to_string(),
        TYPE_TXT => "TXT".to_string(),
        28 => "AAAA".to_string(),
        33 => "SRV".to_string(),
        65 => "HTTPS".to_string(),
        255 => "ANY".to_string(),
        other => format!("TYPE{}", other),
    }
}

/// A DNS response.
#[derive(Debug, Clone)]
pub struct DnsResponse {
    pub id: u16,
    pub flags: u16,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
}

/// A DNS question section entry.
#[derive(Debug, Clone)]
pub struct DnsQuestion {
    pub labels: Vec<Vec<u8>>,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuestion {
    pub fn domain(&self) -> String {
        presentation_name(&self.labels)
    }
}

/// A DNS resource record.
#[derive(Debug, Clone)]
pub struct DnsRecord {
    pub labels: Vec<Vec<u8>>,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl DnsRecord {
    /// Build an IN TXT record holding `strings` as consecutive character-strings.
    ///
    /// Strings longer than 255 bytes are split into several character-strings.
    /// Strings that would push the RDATA past the 16-bit RDLENGTH limit are left out.
    pub fn txt<S: AsRef<[u8]>>(labels: &[Vec<u8>], ttl: u32, strings: &[S]) -> Self {
        Self::txt_within(labels, ttl, strings, u16::MAX as usize)
    }

    fn txt_within<S: AsRef<[u8]>>(
        labels: &[Vec<u8>],
        ttl: u32,
        strings: &[S],
        max_rdata: usize,
    ) -> Self {
        let max_rdata = max_rdata.min(u16::MAX as usize);
        let mut rdata = Vec::new();

        let pieces = strings.iter().flat_map(|s| {
            let s = s.as_ref();
            let split: Vec<&[u8]> = if s.is_empty() {
                vec![s]
            } else {
                s.chunks(MAX_STRING_LEN).collect()
            };
            split
        });

        for piece in pieces {
            if rdata.len() + 1 + piece.len() > max_rdata {
                warn!(
                    record = %presentation_name(labels),
                    kept_bytes = rdata.len(),
                    max_rdata,
                    "TXT payload exceeds message size limit, truncating"
                );
                break;
            }
            rdata.push(piece.len() as u8);
            rdata.extend_from_slice(piece);
        }

        Self {
            labels: labels.to_vec(),
            rtype: TYPE_TXT,
            class: CLASS_IN,
            ttl,
            rdata,
        }
    }

    pub fn owner(&self) -> String {
        presentation_name(&self.labels)
    }

    /// Split TXT RDATA back into its character-strings.
    pub fn txt_strings(&self) -> Option<Vec<Vec<u8>>> {
        let mut strings = Vec::new();
        let mut pos = 0;
        while pos < self.rdata.len() {
            let len = self.rdata[pos] as usize;
            pos += 1;
            if pos + len > self.rdata.len() {
                return None;
            }
            strings.push(self.rdata[pos..pos + len].to_vec());
            pos += len;
        }
        Some(strings)
    }
}

impl DnsResponse {
    pub fn is_authoritative(&self) -> bool {
        self.flags & FLAG_AA != 0
    }

    /// Append a TXT answer owned by the first question's name.
    ///
    /// The RDATA is capped so the encoded message still fits a TCP frame.
    pub fn push_txt_answer<S: AsRef<[u8]>>(&mut self, ttl: u32, strings: &[S]) {
        let labels = self
            .questions
            .first()
            .map(|q| q.labels.clone())
            .unwrap_or_default();
        let owner_len = if self.questions.is_empty() {
            wire_len(&labels)
        } else {
            2
        };

        let budget = MAX_MESSAGE_LEN.saturating_sub(self.to_bytes().len() + owner_len + 10);
        let record = DnsRecord::txt_within(&labels, ttl, strings, budget);
        self.answers.push(record);
    }

    /// Encode the response to wire format bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(512);

        // Header
        data.extend_from_slice(&self.id.to_be_bytes());
        data.extend_from_slice(&self.flags.to_be_bytes());
        data.extend_from_slice(&(self.questions.len() as u16).to_be_bytes());
        data.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        data.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
        data.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

        // Questions
        for q in &self.questions {
            Self::encode_domain(&mut data, &q.labels);
            data.extend_from_slice(&q.qtype.to_be_bytes());
            data.extend_from_slice(&q.qclass.to_be_bytes());
        }

        // Answers
        for a in &self.answers {
            // Use compression pointer if this is the first question's domain
            if !self.questions.is_empty() && a.labels == self.questions[0].labels {
                data.extend_from_slice(&[0xC0, 0x0C]); // Pointer to offset 12
            } else {
                Self::encode_domain(&mut data, &a.labels);
            }
            data.extend_from_slice(&a.rtype.to_be_bytes());
            data.extend_from_slice(&a.class.to_be_bytes());
            data.extend_from_slice(&a.ttl.to_be_bytes());
            data.extend_from_slice(&(a.rdata.len() as u16).to_be_bytes());
            data.extend_from_slice(&a.rdata);
        }

        data
    }

    fn encode_domain(buf: &mut Vec<u8>, labels: &[Vec<u8>]) {
        for label in labels {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label);
        }
        buf.push(0);
    }

    /// Parse a response produced by [`DnsResponse::to_bytes`].
    ///
    /// Understands uncompressed names and pointers to the first question,
    /// which is all this server ever emits.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }

        let id = u16::from_be_bytes([data[0], data[1]]);
        let flags = u16::from_be_bytes([data[2], data[3]]);
        let qdcount = u16::from_be_bytes([data[4], data[5]]) as usize;
        let ancount = u16::from_be_bytes([data[6], data[7]]) as usize;

        let mut pos = HEADER_LEN;
        let mut questions = Vec::with_capacity(qdcount);
        for _ in 0..qdcount {
            let labels = Self::decode_domain(data, &mut pos)?;
            let fixed = data.get(pos..pos + 4)?;
            questions.push(DnsQuestion {
                labels,
                qtype: u16::from_be_bytes([fixed[0], fixed[1]]),
                qclass: u16::from_be_bytes([fixed[2], fixed[3]]),
            });
            pos += 4;
        }

        let mut answers = Vec::with_capacity(ancount);
        for _ in 0..ancount {
            let labels = Self::decode_domain(data, &mut pos)?;
            let fixed = data.get(pos..pos + 10)?;
            let rtype = u16::from_be_bytes([fixed[0], fixed[1]]);
            let class = u16::from_be_bytes([fixed[2], fixed[3]]);
            let ttl = u32::from_be_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
            let rdlength = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
            pos += 10;
            let rdata = data.get(pos..pos + rdlength)?.to_vec();
            pos += rdlength;
            answers.push(DnsRecord {
                labels,
                rtype,
                class,
                ttl,
                rdata,
            });
        }

        Some(Self {
            id,
            flags,
            questions,
            answers,
        })
    }

    fn decode_domain(data: &[u8], pos: &mut usize) -> Option<Vec<Vec<u8>>> {
        let mut labels = Vec::new();
        loop {
            let b = *data.get(*pos)? as usize;
            if b >= 0xC0 {
                let target = ((b & 0x3F) << 8) | *data.get(*pos + 1)? as usize;
                *pos += 2;
                // Only backwards pointers
                if target >= *pos - 2 {
                    return None;
                }
                let mut inner = target;
                labels.extend(Self::decode_domain(data, &mut inner)?);
                break;
            }
            *pos += 1;
            if b == 0 {
                break;
            }
            labels.push(data.get(*pos..*pos + b)?.to_vec());
            *pos += b;
        }
        Some(labels)
    }
}
