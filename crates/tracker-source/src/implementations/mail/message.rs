//! Reader for RFC 5322 messages with MIME bodies.
//!
//! Covers what order notification mails use: folded headers, RFC 2047
//! encoded words, nested multiparts, base64 and quoted-printable transfer
//! encodings, and UTF-8 or Latin-1 charsets. HTML bodies are flattened to
//! text.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
	#[error("No header section found")]
	MissingHeaders,
}

/// A parsed message or MIME part.
#[derive(Debug, Clone)]
pub struct MailMessage {
	headers: Vec<(String, String)>,
	body: Vec<u8>,
	parts: Vec<MailMessage>,
}

/// Media type and parameters of a `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContentType {
	mime: String,
	params: Vec<(String, String)>,
}

impl ContentType {
	/// RFC 2045 default for parts without a `Content-Type` header.
	fn default_text() -> Self {
		Self {
			mime: "text/plain".to_string(),
			params: Vec::new(),
		}
	}

	fn parse(value: &str) -> Self {
		let mut pieces = value.split(';');
		let mime = pieces
			.next()
			.map(|m| m.trim().to_ascii_lowercase())
			.filter(|m| !m.is_empty())
			.unwrap_or_else(|| "text/plain".to_string());
		let params = pieces
			.filter_map(|piece| {
				let (name, value) = piece.split_once('=')?;
				Some((
					name.trim().to_ascii_lowercase(),
					value.trim().trim_matches('"').to_string(),
				))
			})
			.collect();
		Self { mime, params }
	}

	fn param(&self, name: &str) -> Option<&str> {
		self.params
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.as_str())
	}
}

impl MailMessage {
	/// Parses a complete message. At least one header line is required.
	pub fn parse(raw: &[u8]) -> Result<Self, MessageError> {
		let message = Self::parse_part(raw);
		if message.headers.is_empty() {
			return Err(MessageError::MissingHeaders);
		}
		Ok(message)
	}

	fn parse_part(raw: &[u8]) -> Self {
		let (head, body) = split_head(raw);
		let headers = parse_headers(&String::from_utf8_lossy(head));
		let mut message = Self {
			headers,
			body: body.to_vec(),
			parts: Vec::new(),
		};

		let content_type = message.content_type();
		if content_type.mime.starts_with("multipart/") {
			if let Some(boundary) = content_type.param("boundary") {
				message.parts = split_multipart(body, boundary)
					.into_iter()
					.map(Self::parse_part)
					.collect();
			}
		}
		message
	}

	/// Raw value of the first header called `name`, unfolded.
	fn raw_header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Header value with encoded words decoded.
	pub fn header(&self, name: &str) -> Option<String> {
		self.raw_header(name).map(decode_words)
	}

	fn content_type(&self) -> ContentType {
		self.raw_header("Content-Type")
			.map(ContentType::parse)
			.unwrap_or_else(ContentType::default_text)
	}

	/// Body after transfer decoding, converted to text with the part charset.
	fn decoded_text(&self) -> String {
		let encoding = self
			.raw_header("Content-Transfer-Encoding")
			.map(|e| e.trim().to_ascii_lowercase())
			.unwrap_or_default();
		let bytes = match encoding.as_str() {
			"base64" => decode_base64(&self.body),
			"quoted-printable" => decode_quoted_printable(&self.body),
			_ => self.body.clone(),
		};
		decode_charset(&bytes, self.content_type().param("charset"))
	}

	fn walk<'a>(&'a self, out: &mut Vec<&'a MailMessage>) {
		out.push(self);
		for part in &self.parts {
			part.walk(out);
		}
	}

	/// Text of the message body.
	///
	/// The first non-empty `text/plain` part wins. Otherwise the last
	/// `text/html` part is converted to text.
	pub fn text_body(&self) -> String {
		if self.parts.is_empty() {
			let text = self.decoded_text();
			return match self.content_type().mime.as_str() {
				"text/html" => html_to_text(&text),
				_ => text,
			};
		}

		let mut all = Vec::new();
		self.walk(&mut all);
		let mut body = String::new();
		for part in all {
			match part.content_type().mime.as_str() {
				"text/plain" => {
					let text = part.decoded_text();
					if !text.is_empty() {
						return text;
					}
				},
				"text/html" => {
					let html = part.decoded_text();
					if !html.is_empty() {
						body = html_to_text(&html);
					}
				},
				_ => {},
			}
		}
		body
	}
}

/// Splits at the first empty line.
fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
	if raw.starts_with(b"\r\n") {
		return (&[], &raw[2..]);
	}
	if raw.starts_with(b"\n") {
		return (&[], &raw[1..]);
	}
	for (index, window) in raw.windows(2).enumerate() {
		if window == b"\n\n" {
			return (&raw[..index + 1], &raw[index + 2..]);
		}
		if window == b"\n\r" && raw.get(index + 2) == Some(&b'\n') {
			return (&raw[..index + 1], &raw[index + 3..]);
		}
	}
	(raw, &[])
}

fn parse_headers(head: &str) -> Vec<(String, String)> {
	let mut headers: Vec<(String, String)> = Vec::new();
	for line in head.lines() {
		let line = line.trim_end_matches('\r');
		if line.starts_with([' ', '\t']) {
			if let Some((_, value)) = headers.last_mut() {
				value.push(' ');
				value.push_str(line.trim());
			}
			continue;
		}
		if let Some((name, value)) = line.split_once(':') {
			headers.push((name.trim().to_string(), value.trim().to_string()));
		}
	}
	headers
}

/// Returns the raw parts between the `--boundary` delimiter lines.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
	let delimiter = format!("--{}", boundary);
	let mut parts = Vec::new();
	let mut current: Option<usize> = None;
	let mut offset = 0;

	for line in body.split_inclusive(|&b| b == b'\n') {
		let trimmed = trim_line(line);
		if trimmed.starts_with(delimiter.as_bytes()) {
			if let Some(start) = current {
				parts.push(strip_final_newline(&body[start..offset]));
			}
			if trimmed[delimiter.len()..].starts_with(b"--") {
				return parts;
			}
			current = Some(offset + line.len());
		}
		offset += line.len();
	}
	if let Some(start) = current {
		parts.push(&body[start..]);
	}
	parts
}

fn trim_line(line: &[u8]) -> &[u8] {
	let mut end = line.len();
	while end > 0 && matches!(line[end - 1], b'\n' | b'\r' | b' ' | b'\t') {
		end -= 1;
	}
	&line[..end]
}

/// The line break before a delimiter belongs to the delimiter.
fn strip_final_newline(part: &[u8]) -> &[u8] {
	let part = part.strip_suffix(b"\n").unwrap_or(part);
	part.strip_suffix(b"\r").unwrap_or(part)
}

fn base64_value(byte: u8) -> Option<u8> {
	match byte {
		b'A'..=b'Z' => Some(byte - b'A'),
		b'a'..=b'z' => Some(byte - b'a' + 26),
		b'0'..=b'9' => Some(byte - b'0' + 52),
		b'+' => Some(62),
		b'/' => Some(63),
		_ => None,
	}
}

/// Decodes base64, skipping line breaks and any other foreign characters.
fn decode_base64(input: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(input.len() * 3 / 4);
	let mut buffer: u32 = 0;
	let mut bits = 0;
	for &byte in input {
		if byte == b'=' {
			break;
		}
		let Some(value) = base64_value(byte) else {
			continue;
		};
		buffer = (buffer << 6) | u32::from(value);
		bits += 6;
		if bits >= 8 {
			bits -= 8;
			out.push((buffer >> bits) as u8);
			buffer &= (1 << bits) - 1;
		}
	}
	out
}

fn hex_pair(high: u8, low: u8) -> Option<u8> {
	let digit = |b: u8| char::from(b).to_digit(16);
	Some((digit(high)? * 16 + digit(low)?) as u8)
}

fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(input.len());
	let mut i = 0;
	while i < input.len() {
		if input[i] != b'=' {
			out.push(input[i]);
			i += 1;
			continue;
		}
		match (input.get(i + 1), input.get(i + 2)) {
			(Some(b'\r'), Some(b'\n')) => i += 3,
			(Some(b'\n'), _) => i += 2,
			(Some(&high), Some(&low)) => match hex_pair(high, low) {
				Some(byte) => {
					out.push(byte);
					i += 3;
				},
				None => {
					out.push(b'=');
					i += 1;
				},
			},
			_ => {
				out.push(b'=');
				i += 1;
			},
		}
	}
	out
}

fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
	match charset.map(str::to_ascii_lowercase).as_deref() {
		Some("iso-8859-1" | "iso-8859-15" | "latin1" | "windows-1252") => {
			bytes.iter().map(|&b| char::from(b)).collect()
		},
		_ => String::from_utf8_lossy(bytes).into_owned(),
	}
}

fn decode_word(charset: &str, encoding: &str, text: &str) -> String {
	let bytes = if encoding.eq_ignore_ascii_case("b") {
		decode_base64(text.as_bytes())
	} else {
		decode_quoted_printable(text.replace('_', " ").as_bytes())
	};
	decode_charset(&bytes, Some(charset))
}

/// Decodes RFC 2047 encoded words. Whitespace between two adjacent encoded
/// words is dropped.
fn decode_words(value: &str) -> String {
	let Ok(re) = Regex::new(r"=\?([^?\s]+)\?([BbQq])\?([^?\s]*)\?=") else {
		return value.to_string();
	};

	let mut result = String::with_capacity(value.len());
	let mut last = 0;
	for cap in re.captures_iter(value) {
		let (Some(full), Some(charset), Some(encoding), Some(text)) =
			(cap.get(0), cap.get(1), cap.get(2), cap.get(3))
		else {
			continue;
		};
		let gap = &value[last..full.start()];
		if !(last > 0 && gap.trim().is_empty()) {
			result.push_str(gap);
		}
		result.push_str(&decode_word(charset.as_str(), encoding.as_str(), text.as_str()));
		last = full.end();
	}
	result.push_str(&value[last..]);
	result
}

fn decode_entity(entity: &str) -> Option<char> {
	match entity {
		"amp" => Some('&'),
		"lt" => Some('<'),
		"gt" => Some('>'),
		"quot" => Some('"'),
		"apos" => Some('\''),
		"nbsp" => Some('\u{a0}'),
		_ => {
			let code = entity.strip_prefix('#')?;
			let value = match code.strip_prefix(['x', 'X']) {
				Some(hex) => u32::from_str_radix(hex, 16).ok()?,
				None => code.parse().ok()?,
			};
			char::from_u32(value)
		},
	}
}

/// Flattens HTML to text.
///
/// Script and style content is dropped, `br`, `p`, `div`, `tr` and `li`
/// start a new line and character references are decoded.
pub fn html_to_text(html: &str) -> String {
	let patterns = [
		(r"(?s)<!--.*?-->", ""),
		(r"(?is)<script\b.*?</script\s*>", ""),
		(r"(?is)<style\b.*?</style\s*>", ""),
		(r"(?i)<(?:br|p|div|tr|li)\b[^>]*>", "\n"),
		(r"(?s)<[^>]*>", ""),
	];
	let mut text = html.to_string();
	for (pattern, replacement) in patterns {
		if let Ok(re) = Regex::new(pattern) {
			text = re.replace_all(&text, replacement).into_owned();
		}
	}

	let Ok(entity) = Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});") else {
		return text;
	};
	entity
		.replace_all(&text, |cap: &regex::Captures| {
			decode_entity(&cap[1])
				.map(String::from)
				.unwrap_or_else(|| cap[0].to_string())
		})
		.into_owned()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_folded_and_encoded_headers() {
		let raw = b"From: Amazon.de <order-update@amazon.de>\r\n\
Subject: =?utf-8?b?RXhww6lkacOpOiBDb21tYW5kZSAxMjMtNDU2Nzg5MC0xMjM0NTY3?=\r\n\
X-Long: first\r\n  second\r\n\r\nbody";
		let message = MailMessage::parse(raw).unwrap();
		assert_eq!(
			message.header("subject").as_deref(),
			Some("Expédié: Commande 123-4567890-1234567")
		);
		assert_eq!(message.header("X-Long").as_deref(), Some("first second"));
		assert_eq!(message.text_body(), "body");
	}

	#[test]
	fn test_adjacent_encoded_words() {
		assert_eq!(
			decode_words("=?utf-8?q?Zugestellt=3A_?= =?iso-8859-1?q?Bestellung_gr=FC=DF?="),
			"Zugestellt: Bestellung grüß"
		);
		assert_eq!(decode_words("plain subject"), "plain subject");
	}

	#[test]
	fn test_transfer_encodings() {
		assert_eq!(decode_base64(b"SWhyIFBh\r\nY2tldA=="), b"Ihr Packet");
		assert_eq!(
			decode_quoted_printable(b"Zustellung am 15.=\r\n03.2025 f=C3=BCr Sie"),
			"Zustellung am 15.03.2025 für Sie".as_bytes()
		);
		assert_eq!(decode_charset(&[0x4c, 0x69, 0x76, 0x72, 0xe9], Some("ISO-8859-1")), "Livré");
	}

	#[test]
	fn test_multipart_prefers_plain_text() {
		let raw = b"From: a@b\r\n\
Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n\r\n\
preamble\r\n\
--XYZ\r\n\
Content-Type: text/html; charset=utf-8\r\n\r\n\
<p>html</p>\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: base64\r\n\r\n\
cGxhaW4gdGV4dA==\r\n\
--XYZ--\r\n";
		let message = MailMessage::parse(raw).unwrap();
		assert_eq!(message.text_body(), "plain text");
	}

	#[test]
	fn test_nested_multipart_html_only() {
		let raw = b"From: a@b\n\
Content-Type: multipart/mixed; boundary=outer\n\n\
--outer\n\
Content-Type: multipart/alternative; boundary=inner\n\n\
--inner\n\
Content-Type: text/html\n\n\
<div>Lieferung am 15.03.2025</div>\n\
--inner--\n\
--outer\n\
Content-Type: application/pdf\n\n\
%PDF\n\
--outer--\n";
		let message = MailMessage::parse(raw).unwrap();
		assert_eq!(message.text_body(), "\nLieferung am 15.03.2025");
	}

	#[test]
	fn test_html_to_text() {
		let html = "<html><head><style>p { color: red }</style><script>var x = '<p>';</script></head>\
<body><p>Bestellung&nbsp;123 &amp; mehr</p>Zeile<br/>zwei<!-- <p>hidden</p> --> &#233;&#xE9; &unknown;</body></html>";
		assert_eq!(
			html_to_text(html),
			"\nBestellung\u{a0}123 & mehrZeile\nzwei éé &unknown;"
		);
	}

	#[test]
	fn test_not_a_message() {
		assert_eq!(
			MailMessage::parse(b"\r\njust a body").unwrap_err(),
			MessageError::MissingHeaders
		);
	}
}
