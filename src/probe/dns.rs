//! DNS probe implementation using raw UDP packets.

use super::{ProbeError, ProbeOutcome, ProbeSettings};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tokio::net::UdpSocket;

const DEFAULT_QUESTION: &str = "example.com";
const HEADER_LEN: usize = 12;
/// Compression pointers followed before a name is considered malformed.
const MAX_POINTER_JUMPS: usize = 16;

/// Record types the probe can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Mx,
    Txt,
    Aaaa,
}

impl RecordType {
    pub fn parse(s: &str) -> Result<Self, ProbeError> {
        match s.to_uppercase().as_str() {
            "" | "A" => Ok(Self::A),
            "NS" => Ok(Self::Ns),
            "CNAME" => Ok(Self::Cname),
            "MX" => Ok(Self::Mx),
            "TXT" => Ok(Self::Txt),
            "AAAA" => Ok(Self::Aaaa),
            other => Err(ProbeError::Config(format!("unsupported DNS record type: {}", other))),
        }
    }

    fn code(self) -> u16 {
        match self {
            Self::A => 1,
            Self::Ns => 2,
            Self::Cname => 5,
            Self::Mx => 15,
            Self::Txt => 16,
            Self::Aaaa => 28,
        }
    }
}

/// Expected answer, matched either exactly or by regular expression.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerMatcher {
    pub regex: String,
    pub exact: String,
}

#[derive(Debug)]
enum AnswerCheck {
    Exact(String),
    Pattern(Regex),
}

impl AnswerCheck {
    fn from_matcher(m: &AnswerMatcher) -> Result<Self, ProbeError> {
        if !m.regex.is_empty() {
            let re = Regex::new(&m.regex)
                .map_err(|e| ProbeError::Config(format!("invalid answer regex: {}", e)))?;
            return Ok(Self::Pattern(re));
        }
        if !m.exact.is_empty() {
            return Ok(Self::Exact(m.exact.trim_end_matches('.').to_string()));
        }
        Err(ProbeError::Config(
            "answer needs either 'regex' or 'exact'".to_string(),
        ))
    }

    fn matches(&self, answer: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == answer,
            Self::Pattern(re) => re.is_match(answer),
        }
    }

    fn describe(&self) -> &str {
        match self {
            Self::Exact(expected) => expected,
            Self::Pattern(re) => re.as_str(),
        }
    }
}

/// Queries a resolver and optionally checks the returned records.
#[derive(Debug)]
pub struct DnsProbe {
    server: String,
    question: String,
    record_type: RecordType,
    checks: Vec<AnswerCheck>,
    timeout: Duration,
}

impl DnsProbe {
    pub fn new(address: &str, settings: &ProbeSettings, timeout: Duration) -> Result<Self, ProbeError> {
        if address.is_empty() {
            return Err(ProbeError::Config("DNS target (resolver) is required".to_string()));
        }

        // Ensure address has port
        let server = if address.contains(':') {
            address.to_string()
        } else {
            format!("{}:53", address)
        };

        let question = if settings.question.is_empty() {
            DEFAULT_QUESTION.to_string()
        } else {
            settings.question.trim_end_matches('.').to_string()
        };
        encode_name(&question)?;

        let checks = settings
            .answers
            .iter()
            .map(AnswerCheck::from_matcher)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            server,
            question,
            record_type: RecordType::parse(&settings.dns_type)?,
            checks,
            timeout,
        })
    }

    pub async fn test(&self) -> ProbeOutcome {
        let answers = match self.query().await {
            Ok(answers) => answers,
            Err(e) => return ProbeOutcome::down(e.to_string()),
        };

        for check in &self.checks {
            if !answers.iter().any(|a| check.matches(a)) {
                return ProbeOutcome::down(format!(
                    "DNS answer not found: {} (got {:?})",
                    check.describe(),
                    answers
                ));
            }
        }

        ProbeOutcome::up()
    }

    /// Send the query and return the decoded answers of the requested type.
    async fn query(&self) -> Result<Vec<String>, ProbeError> {
        let tx_id: u16 = rand::random();
        let packet = build_query(tx_id, &self.question, self.record_type)?;

        let exchange = async {
            let socket = UdpSocket::bind("0.0.0.0:0")
                .await
                .map_err(|e| ProbeError::Network(format!("failed to bind socket: {}", e)))?;
            socket
                .connect(&self.server)
                .await
                .map_err(|e| ProbeError::Network(format!("failed to connect: {}", e)))?;
            socket
                .send(&packet)
                .await
                .map_err(|e| ProbeError::Network(format!("failed to send: {}", e)))?;

            let mut response = vec![0u8; 4096];
            let n = socket
                .recv(&mut response)
                .await
                .map_err(|e| ProbeError::Network(format!("failed to recv: {}", e)))?;
            response.truncate(n);
            Ok::<_, ProbeError>(response)
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        parse_response(&response, tx_id, self.record_type)
    }
}

/// Encode a domain name as length-prefixed labels.
fn encode_name(name: &str) -> Result<Vec<u8>, ProbeError> {
    let mut out = Vec::with_capacity(name.len() + 2);
    for label in name.split('.').filter(|l| !l.is_empty()) {
        if label.len() > 63 {
            return Err(ProbeError::Config(format!("DNS label too long: {}", label)));
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0); // Null terminator
    if out.len() > 255 {
        return Err(ProbeError::Config(format!("DNS name too long: {}", name)));
    }
    Ok(out)
}

/// Build a DNS query packet for a single question.
fn build_query(tx_id: u16, name: &str, record_type: RecordType) -> Result<Vec<u8>, ProbeError> {
    let flags: u16 = 0x0100; // Standard query, recursion desired

    // Header (12 bytes)
    let mut packet = Vec::with_capacity(64);
    packet.extend_from_slice(&tx_id.to_be_bytes());
    packet.extend_from_slice(&flags.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // ANCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT

    packet.extend_from_slice(&encode_name(name)?);
    packet.extend_from_slice(&record_type.code().to_be_bytes());
    // QCLASS: IN (1)
    packet.extend_from_slice(&1u16.to_be_bytes());

    Ok(packet)
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, ProbeError> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| ProbeError::Network("truncated DNS response".to_string()))
}

/// Read a possibly compressed name starting at `offset`.
///
/// Returns the dotted name and the offset just past it in the original
/// (uncompressed) position.
fn read_name(buf: &[u8], mut offset: usize) -> Result<(String, usize), ProbeError> {
    let truncated = || ProbeError::Network("truncated DNS name".to_string());
    let mut labels = Vec::new();
    let mut end = None;
    let mut jumps = 0;

    loop {
        let len = *buf.get(offset).ok_or_else(truncated)? as usize;
        if len == 0 {
            end.get_or_insert(offset + 1);
            break;
        }

        if len & 0xC0 == 0xC0 {
            let low = *buf.get(offset + 1).ok_or_else(truncated)? as usize;
            end.get_or_insert(offset + 2);
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(ProbeError::Network("DNS name pointer loop".to_string()));
            }
            offset = ((len & 0x3F) << 8) | low;
            continue;
        }

        let label = buf.get(offset + 1..offset + 1 + len).ok_or_else(truncated)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        offset += 1 + len;
    }

    Ok((labels.join("."), end.unwrap_or(offset)))
}

fn decode_rdata(buf: &[u8], start: usize, rdata: &[u8], rtype: u16) -> Result<Option<String>, ProbeError> {
    let value = match rtype {
        1 if rdata.len() == 4 => Some(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]).to_string()),
        28 if rdata.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            Some(Ipv6Addr::from(octets).to_string())
        }
        2 | 5 => Some(read_name(buf, start)?.0),
        15 => {
            let preference = read_u16(buf, start)?;
            let (exchange, _) = read_name(buf, start + 2)?;
            Some(format!("{} {}", preference, exchange))
        }
        16 => {
            let mut text = String::new();
            let mut i = 0;
            while i < rdata.len() {
                let len = rdata[i] as usize;
                let chunk = rdata
                    .get(i + 1..i + 1 + len)
                    .ok_or_else(|| ProbeError::Network("truncated TXT record".to_string()))?;
                text.push_str(&String::from_utf8_lossy(chunk));
                i += 1 + len;
            }
            Some(text)
        }
        _ => None,
    };
    Ok(value)
}

/// Validate a response and decode the answers of the requested type.
fn parse_response(buf: &[u8], tx_id: u16, record_type: RecordType) -> Result<Vec<String>, ProbeError> {
    if buf.len() < HEADER_LEN {
        return Err(ProbeError::Network(format!("response too short: {} bytes", buf.len())));
    }

    let resp_tx_id = read_u16(buf, 0)?;
    if resp_tx_id != tx_id {
        return Err(ProbeError::Network(format!(
            "transaction ID mismatch: got {}, expected {}",
            resp_tx_id, tx_id
        )));
    }

    // Check RCODE (lower 4 bits of byte 3)
    let rcode = buf[3] & 0x0F;
    if rcode != 0 {
        return Err(ProbeError::Network(format!("DNS error RCODE: {}", rcode)));
    }

    let qd_count = read_u16(buf, 4)?;
    let an_count = read_u16(buf, 6)?;

    let mut offset = HEADER_LEN;
    for _ in 0..qd_count {
        let (_, next) = read_name(buf, offset)?;
        offset = next + 4; // QTYPE + QCLASS
    }

    let mut answers = Vec::new();
    for _ in 0..an_count {
        let (_, next) = read_name(buf, offset)?;
        let rtype = read_u16(buf, next)?;
        let rdlength = read_u16(buf, next + 8)? as usize;
        let start = next + 10;
        let rdata = buf
            .get(start..start + rdlength)
            .ok_or_else(|| ProbeError::Network("truncated DNS record".to_string()))?;

        if rtype == record_type.code() {
            if let Some(value) = decode_rdata(buf, start, rdata, rtype)? {
                answers.push(value);
            }
        }
        offset = start + rdlength;
    }

    Ok(answers)
}
