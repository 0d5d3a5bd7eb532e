/// Byte-wise glob matching for `keys` and `scan`.
///
/// Supports `*`, `?`, character classes (`[abc]`, `[a-z]`, `[^x]` / `[!x]`)
/// and `\` escapes. Iterative with single-star backtracking, so the worst
/// case is O(pattern * text).
pub fn glob_match(
    pattern: &[u8],
    text: &[u8],
) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    star = Some((p, t));
                    p += 1;
                    continue;
                }
                b'?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                b'[' => {
                    if let Some((matched, next)) = match_class(pattern, p, text[t]) {
                        if matched {
                            p = next;
                            t += 1;
                            continue;
                        }
                    } else if text[t] == b'[' {
                        // unterminated class matches a literal '['
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
                b'\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c => {
                    if c == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }
        // mismatch: let the last star absorb one more byte
        match star {
            Some((sp, st)) => {
                star = Some((sp, st + 1));
                p = sp + 1;
                t = st + 1;
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|c| *c == b'*')
}

/// Matches `ch` against the class opening at `pattern[open]`.
/// Returns the result and the index just past `]`, or `None` if unterminated.
fn match_class(
    pattern: &[u8],
    open: usize,
    ch: u8,
) -> Option<(bool, usize)> {
    let mut i = open + 1;
    let negate = matches!(pattern.get(i), Some(b'^') | Some(b'!'));
    if negate {
        i += 1;
    }

    let mut found = false;
    let mut first = true;
    loop {
        let c = *pattern.get(i)?;
        if c == b']' && !first {
            break;
        }
        first = false;
        let lo = if c == b'\\' {
            i += 1;
            *pattern.get(i)?
        } else {
            c
        };
        if pattern.get(i + 1) == Some(&b'-') && pattern.get(i + 2).is_some_and(|c| *c != b']') {
            let hi = pattern[i + 2];
            if lo <= ch && ch <= hi {
                found = true;
            }
            i += 3;
        } else {
            if lo == ch {
                found = true;
            }
            i += 1;
        }
    }
    Some((found != negate, i + 1))
}
