/// Returns true if every character of `partial` appears in `full`, in order,
/// ignoring case. Surrounding quotes on `partial` are ignored.
///
/// An empty partial matches everything.
pub fn matches_partial(full: &str, partial: &str) -> bool {
	let partial = partial.trim().trim_matches('"');
	let mut haystack = full.chars().flat_map(char::to_lowercase);
	partial
		.chars()
		.flat_map(char::to_lowercase)
		.all(|needle| haystack.any(|ch| ch == needle))
}

#[cfg(test)]
mod tests {
	use super::matches_partial;

	#[test]
	fn subsequence_matches() {
		assert!(matches_partial("Thunderbolt", "tbolt"));
		assert!(matches_partial("Thunderbolt", "THUN"));
		assert!(matches_partial("Tackle", ""));
	}

	#[test]
	fn order_matters() {
		assert!(!matches_partial("Tackle", "kt"));
		assert!(!matches_partial("Tackle", "tackles"));
	}

	#[test]
	fn quotes_are_ignored() {
		assert!(matches_partial("Mr. Mime", "\"mr m"));
	}
}
