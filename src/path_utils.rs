//! Escape handling for watched bus paths.
//!
//! Node names on the historian's own tree cannot contain `/` or `.`, so the
//! bus path is stored with `%2F` and `%2E` escapes. Decoding must be applied
//! exactly once, on the raw node name; encoding is the inverse for display
//! and node naming.

/// Decode a raw node name into the watched bus path.
pub fn decode_node_name(raw: &str) -> String {
	raw.replace("%2F", "/").replace("%2E", ".")
}

/// Encode a watched bus path into a node name.
pub fn encode_watch_path(path: &str) -> String {
	path.replace('/', "%2F").replace('.', "%2E")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_decode_node_name() {
		assert_eq!(decode_node_name("downstream%2Fsensor%2Ftemp"), "downstream/sensor/temp");
		assert_eq!(decode_node_name("a%2Eb"), "a.b");
		assert_eq!(decode_node_name("plain"), "plain");
	}

	#[test]
	fn test_encode_round_trip() {
		let path = "/downstream/room.1/temp";
		assert_eq!(decode_node_name(&encode_watch_path(path)), path);
	}
}
