/// Optimal string alignment distance: Levenshtein plus adjacent
/// transpositions, so `studnets` is one edit away from `students`.
pub fn osa_distance(left: &str, right: &str) -> usize {
    let a: Vec<char> = left.chars().collect();
    let b: Vec<char> = right.chars().collect();
    let n = b.len();
    if a.is_empty() {
        return n;
    }
    if n == 0 {
        return a.len();
    }

    let mut before_prev: Vec<usize> = vec![0; n + 1];
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr: Vec<usize> = vec![0; n + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let deletion = prev[j] + 1;
            let insertion = curr[j - 1] + 1;
            let substitution = prev[j - 1] + cost;
            let mut d = deletion.min(insertion).min(substitution);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                d = d.min(before_prev[j - 2] + 1);
            }
            curr[j] = d;
        }
        std::mem::swap(&mut before_prev, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Case-insensitive similarity in `[0, 1]`, 1 meaning identical.
pub fn similarity(left: &str, right: &str) -> f64 {
    let left = left.to_lowercase();
    let right = right.to_lowercase();
    let longest = left.chars().count().max(right.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - osa_distance(&left, &right) as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::{osa_distance, similarity};

    #[test]
    fn transposition_costs_one_edit() {
        assert_eq!(osa_distance("studnets", "students"), 1);
        assert_eq!(osa_distance("kitten", "sitting"), 3);
        assert_eq!(osa_distance("", "abc"), 3);
    }

    #[test]
    fn similarity_is_case_insensitive() {
        assert!((similarity("Students", "students") - 1.0).abs() < f64::EPSILON);
        assert!(similarity("studnets", "students") > 0.8);
        assert!(similarity("grade", "students") < 0.5);
    }
}
