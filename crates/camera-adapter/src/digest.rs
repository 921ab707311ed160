//! HTTP Digest authentication (RFC 2617, with the RFC 2069 fallback) for devices
//! that challenge every request, such as Hikvision ISAPI.

use crate::error::{CameraError, Result};
use rand::RngCore;

/// Nonce count sent with every response. Each challenge is answered exactly once.
pub const NONCE_COUNT: &str = "00000001";

/// Source of client nonces. Injected so tests can pin the exact header value.
pub trait CnonceSource: Send + Sync {
    fn cnonce(&self) -> String;
}

/// 8 random bytes, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCnonce;

impl CnonceSource for RandomCnonce {
    fn cnonce(&self) -> String {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct FixedCnonce(pub String);

impl FixedCnonce {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl CnonceSource for FixedCnonce {
    fn cnonce(&self) -> String {
        self.0.clone()
    }
}

/// Parameters of a `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
}

impl DigestChallenge {
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        let params = match header.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("digest") => rest,
            _ => {
                return Err(CameraError::authentication(format!(
                    "not a digest challenge: {}",
                    header
                )))
            }
        };

        let mut realm = None;
        let mut nonce = None;
        let mut qop = None;
        let mut opaque = None;
        let mut algorithm = None;

        for (key, value) in parse_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "qop" => qop = Some(value),
                "opaque" => opaque = Some(value),
                "algorithm" => algorithm = Some(value),
                _ => {}
            }
        }

        let realm = realm.ok_or_else(|| CameraError::authentication("digest challenge missing realm"))?;
        let nonce = nonce.ok_or_else(|| CameraError::authentication("digest challenge missing nonce"))?;

        if let Some(alg) = &algorithm {
            if !alg.eq_ignore_ascii_case("md5") {
                return Err(CameraError::authentication(format!(
                    "unsupported digest algorithm: {}",
                    alg
                )));
            }
        }

        Ok(Self {
            realm,
            nonce,
            qop: select_qop(qop)?,
            opaque,
            algorithm,
        })
    }
}

/// Picks `auth` out of a server qop list. `auth-int` alone is rejected since the
/// request body would have to be hashed into HA2.
fn select_qop(offered: Option<String>) -> Result<Option<String>> {
    let Some(offered) = offered else {
        return Ok(None);
    };
    let options: Vec<&str> = offered
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .collect();

    if options.is_empty() {
        return Ok(None);
    }
    if options.iter().any(|o| o.eq_ignore_ascii_case("auth")) {
        return Ok(Some("auth".to_string()));
    }
    Err(CameraError::authentication(format!("unsupported qop: {}", offered)))
}

/// Splits `key=value, key="quoted, value"` pairs. Quoted values may contain commas
/// and backslash escapes.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.trim().is_empty() {
            break;
        }

        if chars.peek() != Some(&'=') {
            // Bare token without a value.
            continue;
        }
        chars.next();

        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        params.push((key.trim().to_string(), value.trim().to_string()));
    }

    params
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Computes the `Authorization` header value answering `challenge` for one request.
pub fn solve(
    method: &str,
    uri: &str,
    username: &str,
    password: &str,
    challenge: &str,
    cnonce_source: &dyn CnonceSource,
) -> Result<String> {
    let challenge = DigestChallenge::parse(challenge)?;
    Ok(solve_parsed(method, uri, username, password, &challenge, cnonce_source))
}

pub fn solve_parsed(
    method: &str,
    uri: &str,
    username: &str,
    password: &str,
    challenge: &DigestChallenge,
    cnonce_source: &dyn CnonceSource,
) -> String {
    let ha1 = md5_hex(&format!("{}:{}:{}", username, challenge.realm, password));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));

    let mut parts = vec![
        format!("username=\"{}\"", username),
        format!("realm=\"{}\"", challenge.realm),
        format!("nonce=\"{}\"", challenge.nonce),
        format!("uri=\"{}\"", uri),
    ];

    match &challenge.qop {
        Some(qop) => {
            let cnonce = cnonce_source.cnonce();
            let response = md5_hex(&format!(
                "{}:{}:{}:{}:{}:{}",
                ha1, challenge.nonce, NONCE_COUNT, cnonce, qop, ha2
            ));
            parts.push(format!("response=\"{}\"", response));
            parts.push(format!("qop={}", qop));
            parts.push(format!("nc={}", NONCE_COUNT));
            parts.push(format!("cnonce=\"{}\"", cnonce));
        }
        None => {
            let response = md5_hex(&format!("{}:{}:{}", ha1, challenge.nonce, ha2));
            parts.push(format!("response=\"{}\"", response));
        }
    }

    if let Some(opaque) = &challenge.opaque {
        parts.push(format!("opaque=\"{}\"", opaque));
    }
    if let Some(algorithm) = &challenge.algorithm {
        parts.push(format!("algorithm={}", algorithm));
    }

    format!("Digest {}", parts.join(", "))
}
