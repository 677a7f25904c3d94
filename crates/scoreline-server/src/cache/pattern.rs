//! Redis-style key patterns for the in-process tiers.

/// Match `key` against a glob supporting `*` (any run) and `?` (one char).
///
/// This is the subset of Redis `KEYS` syntax the services use; character
/// classes are not supported.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();

    let (mut pi, mut ki) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            resume = ki;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            resume += 1;
            ki = resume;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
