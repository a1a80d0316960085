use super::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Text(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '\'' || ch == '"' {
            chars.next();
            let mut literal = String::new();
            let mut terminated = false;
            while let Some((_, next)) = chars.next() {
                match next {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => literal.push('\n'),
                        Some((_, 't')) => literal.push('\t'),
                        Some((_, escaped)) => literal.push(escaped),
                        None => break,
                    },
                    quote if quote == ch => {
                        terminated = true;
                        break;
                    }
                    other => literal.push(other),
                }
            }
            if !terminated {
                return Err(SyntaxError::new("unterminated string literal", offset));
            }
            tokens.push(Token {
                kind: TokenKind::Text(literal),
                offset,
            });
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut end = offset;
            while let Some(&(idx, next)) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    end = idx + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Ident(source[offset..end].to_string()),
                offset,
            });
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            let end = scan_number(source, offset);
            let text = &source[offset..end];
            let number = text
                .parse::<f64>()
                .map_err(|_| SyntaxError::new(format!("invalid number '{text}'"), offset))?;
            while chars.peek().is_some_and(|&(idx, _)| idx < end) {
                chars.next();
            }
            tokens.push(Token {
                kind: TokenKind::Number(number),
                offset,
            });
            continue;
        }

        chars.next();
        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '*' => {
                if chars.next_if(|&(_, next)| next == '*').is_some() {
                    TokenKind::DoubleStar
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if chars.next_if(|&(_, next)| next == '/').is_some() {
                    TokenKind::DoubleSlash
                } else {
                    TokenKind::Slash
                }
            }
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected character '{other}'"),
                    offset,
                ));
            }
        };
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

/// Byte offset one past the numeric literal starting at `start`:
/// digits, an optional fraction and an optional signed exponent.
fn scan_number(source: &str, start: usize) -> usize {
    let bytes = source.as_bytes();
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx < bytes.len() && bytes[idx] == b'.' {
        idx += 1;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
    }
    if idx < bytes.len() && matches!(bytes[idx], b'e' | b'E') {
        let mut probe = idx + 1;
        if probe < bytes.len() && matches!(bytes[probe], b'+' | b'-') {
            probe += 1;
        }
        if probe < bytes.len() && bytes[probe].is_ascii_digit() {
            idx = probe;
            while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
        }
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenizes_operators_and_identifiers() {
        assert_eq!(
            kinds("field3 * max(field5, refdata4)"),
            vec![
                TokenKind::Ident("field3".into()),
                TokenKind::Star,
                TokenKind::Ident("max".into()),
                TokenKind::LParen,
                TokenKind::Ident("field5".into()),
                TokenKind::Comma,
                TokenKind::Ident("refdata4".into()),
                TokenKind::RParen,
            ]
        );
        assert_eq!(
            kinds("a ** b // c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::DoubleStar,
                TokenKind::Ident("b".into()),
                TokenKind::DoubleSlash,
                TokenKind::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn tokenizes_numbers_with_fraction_and_exponent() {
        assert_eq!(
            kinds("1 2.5 .5 3e2 4E-1"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(2.5),
                TokenKind::Number(0.5),
                TokenKind::Number(300.0),
                TokenKind::Number(0.4),
            ]
        );
    }

    #[test]
    fn tokenizes_quoted_strings_with_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "say \"hi\"""#),
            vec![
                TokenKind::Text("it's".into()),
                TokenKind::Text("say \"hi\"".into()),
            ]
        );
    }

    #[test]
    fn reports_offset_of_bad_character() {
        let err = tokenize("a + $b").unwrap_err();
        assert_eq!(err.offset, 4);
        assert!(err.message.contains("'$'"));
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = tokenize("'open").unwrap_err();
        assert_eq!(err.offset, 0);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn lone_dot_is_invalid_number() {
        assert!(tokenize(".").is_err());
    }
}
