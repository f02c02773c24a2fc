//! Path predicates for choosing which artifacts get the bootstrap block.
//!
//! Supported syntax: `*` (anything but `/`), `**` (any number of whole
//! segments), `?` (one character but `/`) and `{a,b}` alternatives.

/// `true` when `path` matches one of `include` and none of `exclude`.
pub fn matches(path: &str, include: &[String], exclude: &[String]) -> bool {
    let path = normalize(path);
    if exclude.iter().any(|pattern| is_match(pattern, &path)) {
        return false;
    }
    include.iter().any(|pattern| is_match(pattern, &path))
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Match one pattern against a `/`-separated path.
pub fn is_match(pattern: &str, path: &str) -> bool {
    let path = normalize(path);
    expand_braces(&normalize(pattern)).iter().any(|alt| {
        let pattern: Vec<&str> = alt.split('/').collect();
        let segments: Vec<&str> = path.split('/').collect();
        match_segments(&pattern, &segments)
    })
}

fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let mut depth = 0;
    let mut close = None;
    for (i, c) in pattern[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + i);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let (head, body, tail) = (&pattern[..open], &pattern[open + 1..close], &pattern[close + 1..]);
    let mut alternatives = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => {
                alternatives.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    alternatives.push(&body[start..]);

    alternatives
        .into_iter()
        .flat_map(|alt| expand_braces(&format!("{head}{alt}{tail}")))
        .collect()
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    wildcard(
        pattern,
        path,
        |p| *p == "**",
        |p, segment| match_segment(p, segment),
    )
}

fn match_segment(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    wildcard(&pattern, &text, |p| *p == '*', |p, c| *p == '?' || p == c)
}

/// Greedy wildcard match with single-point backtracking: `is_star` elements
/// match any run, every other element matches exactly one item. Runs in
/// O(pattern * text) however many stars the pattern has.
fn wildcard<P, T>(
    pattern: &[P],
    text: &[T],
    is_star: impl Fn(&P) -> bool,
    matches_one: impl Fn(&P, &T) -> bool,
) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && is_star(&pattern[p]) {
            resume = Some((p, t));
            p += 1;
        } else if p < pattern.len() && matches_one(&pattern[p], &text[t]) {
            p += 1;
            t += 1;
        } else if let Some((star, from)) = resume {
            p = star + 1;
            t = from + 1;
            resume = Some((star, from + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(is_star)
}
