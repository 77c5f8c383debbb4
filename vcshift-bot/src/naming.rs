//! Sequential names for generated channels: `General-001`, `General-002`, ...

/// Width of the zero-padded numeric suffix.
const SUFFIX_DIGITS: usize = 3;

/// Parse the suffix of `name` if it is exactly `{base_name}-DDD`.
pub fn suffix_of(base_name: &str, name: &str) -> Option<u32> {
    let digits = name.strip_prefix(base_name)?.strip_prefix('-')?;
    if digits.len() != SUFFIX_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Next free name for `base_name`: one past the highest suffix seen, either
/// among `existing` names or in `floor` (the highest number already handed
/// out, which covers channels deleted since).
///
/// Gaps are not filled, so deleting `-001` while `-002` exists still yields
/// `-003`. Past 999 the suffix widens and stops matching the pattern.
pub fn next_auto_name<'a, I>(base_name: &str, existing: I, floor: u32) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let highest = existing
        .into_iter()
        .filter_map(|name| suffix_of(base_name, name))
        .fold(floor, u32::max);
    format!("{base_name}-{:0width$}", highest + 1, width = SUFFIX_DIGITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_name_is_001() {
        assert_eq!(next_auto_name("General", std::iter::empty(), 0), "General-001");
        assert_eq!(next_auto_name("General", ["General", "Other-004"], 0), "General-001");
    }

    #[test]
    fn continues_past_highest_and_skips_gaps() {
        let names = ["General-001", "General-007", "General-003"];
        assert_eq!(next_auto_name("General", names, 0), "General-008");
    }

    #[test]
    fn only_exact_three_digit_suffixes_count() {
        let names = ["General-01", "General-0042", "General-12a", "General-x99", "General 005"];
        assert_eq!(next_auto_name("General", names, 0), "General-001");
    }

    #[test]
    fn base_name_is_matched_literally() {
        // Characters that would be regex metacharacters must not widen the match.
        let names = ["Room.A-004", "RoomXA-009", "Room.A-"];
        assert_eq!(next_auto_name("Room.A", names, 0), "Room.A-005");
    }

    #[test]
    fn prefix_base_does_not_claim_longer_base() {
        assert_eq!(next_auto_name("Gen", ["General-005"], 0), "Gen-001");
        assert_eq!(next_auto_name("General", ["Gen-005"], 0), "General-001");
    }

    #[test]
    fn stable_for_same_input() {
        let names = vec!["Lobby-002".to_string(), "Lobby-010".to_string()];
        let a = next_auto_name("Lobby", names.iter().map(String::as_str), 0);
        let b = next_auto_name("Lobby", names.iter().map(String::as_str), 0);
        assert_eq!(a, "Lobby-011");
        assert_eq!(a, b);
    }

    #[test]
    fn floor_keeps_deleted_numbers_retired() {
        // -001 and -002 were handed out and -001 has since been deleted.
        assert_eq!(next_auto_name("General", ["General-002"], 2), "General-003");
        assert_eq!(next_auto_name("General", std::iter::empty(), 1), "General-002");
        // A higher live channel still wins over the floor.
        assert_eq!(next_auto_name("General", ["General-009"], 4), "General-010");
    }

    #[test]
    fn widens_after_999() {
        assert_eq!(next_auto_name("Big", ["Big-999"], 0), "Big-1000");
    }
}
