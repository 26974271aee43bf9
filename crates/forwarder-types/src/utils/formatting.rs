//! Hex text helpers.

const SHORT_ID: usize = 10;

/// Shortens a `0x` hash to its first eight hex digits for log fields.
pub fn truncate_id(id: &str) -> String {
	match id.get(..SHORT_ID) {
		Some(head) if id.len() > SHORT_ID => format!("{}..", head),
		_ => id.to_string(),
	}
}

/// Strips one leading `0x` or `0X`.
pub fn without_0x_prefix(text: &str) -> &str {
	match text.as_bytes() {
		[b'0', b'x' | b'X', ..] => &text[2..],
		_ => text,
	}
}
