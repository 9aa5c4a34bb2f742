/// Percentage of typed characters that match the snippet at the same
/// position, rounded down. Characters typed past the end of the snippet
/// never match. An empty input reports 100.
pub fn compute_accuracy(snippet: &str, input: &str) -> u32 {
    let mut expected = snippet.chars();
    let (typed, matches) = input.chars().fold((0u64, 0u64), |(typed, matches), c| {
        let hit = expected.next() == Some(c);
        (typed + 1, matches + u64::from(hit))
    });

    if typed == 0 {
        return 100;
    }

    (matches * 100 / typed) as u32
}

/// Number of whitespace-delimited, non-empty tokens.
pub fn count_words(input: &str) -> usize {
    input.split_whitespace().count()
}

/// Words per minute, rounded down. Zero elapsed time yields 0.
pub fn compute_wpm(input: &str, elapsed_secs: u64) -> u32 {
    if elapsed_secs == 0 {
        return 0;
    }

    (count_words(input) as u64 * 60 / elapsed_secs) as u32
}

/// Index of every position where the input disagrees with the snippet.
pub fn mismatches(snippet: &str, input: &str) -> Vec<usize> {
    let mut expected = snippet.chars();
    input
        .chars()
        .enumerate()
        .filter_map(|(idx, c)| (expected.next() != Some(c)).then_some(idx))
        .collect()
}
