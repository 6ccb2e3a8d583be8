use super::token::{is_punct, Keyword, Token};

/// Tokenises a raw command line (CRLF included) into a sequence of [`Token`]s
/// terminated by [`Token::Eof`].
///
/// Grounded on `server/lib/parser/src/lexer.c` in the retrieved C source: a
/// single left-to-right scan, whitespace collapsed to one `Space` token (or
/// `Crlf` when the run is exactly `"\r\n"`), punctuation emitted one token per
/// character, digit runs folded into `Int`, and identifier runs lower-cased
/// and probed against the keyword table.
pub fn lex(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();

    if chars.is_empty() {
        tokens.push(Token::Eof);
        return tokens;
    }

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if c == ',' {
            tokens.push(Token::Comma);
            i += 1;
        } else if is_punct(c) {
            tokens.push(Token::Punct(c));
            i += 1;
        } else if c == '\r' && chars.get(i + 1) == Some(&'\n') {
            tokens.push(Token::Crlf);
            i += 2;
        } else if c.is_whitespace() {
            let start = i;
            while i < chars.len() && chars[i].is_whitespace() && !(chars[i] == '\r' && chars.get(i + 1) == Some(&'\n'))
            {
                i += 1;
            }
            if i > start {
                tokens.push(Token::Space);
            }
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let run: String = chars[start..i].iter().collect();
            match run.parse::<i64>() {
                Ok(n) => tokens.push(Token::Int(n)),
                // Overflow: stop tokenising this run, guaranteeing the parser
                // rejects the command rather than silently wrapping.
                Err(_) => break,
            }
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphabetic() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect::<String>().to_lowercase();

            match Keyword::from_identifier(&ident) {
                Some(kw) => tokens.push(Token::Keyword(kw)),
                None => tokens.push(Token::String(ident)),
            }
        } else {
            // Anything outside the recognised classes (e.g. raw control bytes)
            // is swallowed silently, same as the source's scan which only
            // special-cases punctuation/space/digit/alpha and otherwise moves
            // the cursor forward without emitting a token.
            i += 1;
        }
    }

    tokens.push(Token::Eof);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::token::Token::*;

    #[test]
    fn lexes_user_command() {
        let tokens = lex("USER alice\r\n");
        assert_eq!(
            tokens,
            vec![Keyword(Keyword::User), Space, String("alice".into()), Crlf, Eof]
        );
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        assert_eq!(lex("uSeR\r\n")[0], Keyword(Keyword::User));
    }

    #[test]
    fn collapses_repeated_whitespace() {
        let tokens = lex("USER   alice\r\n");
        assert_eq!(
            tokens,
            vec![Keyword(Keyword::User), Space, String("alice".into()), Crlf, Eof]
        );
    }

    #[test]
    fn port_line_lexes_into_ints_and_commas() {
        let tokens = lex("PORT 127,0,0,1,7,208\r\n");
        assert_eq!(
            tokens,
            vec![
                Keyword(Keyword::Port),
                Space,
                Int(127),
                Comma,
                Int(0),
                Comma,
                Int(0),
                Comma,
                Int(1),
                Comma,
                Int(7),
                Comma,
                Int(208),
                Crlf,
                Eof,
            ]
        );
    }

    #[test]
    fn empty_input_is_just_eof() {
        assert_eq!(lex(""), vec![Eof]);
    }

    #[test]
    fn digit_overflow_truncates_the_stream() {
        let tokens = lex("PORT 99999999999999999999,0,0,1,7,208\r\n");
        // The overflowing run yields no Int token, so nothing past it is
        // emitted either; the parser is guaranteed to see an incomplete,
        // therefore invalid, production.
        assert!(!tokens.iter().any(|t| matches!(t, Int(_))));
    }

    #[test]
    fn underscore_is_absorbed_into_identifiers_not_punctuation() {
        let tokens = lex("foo_bar\r\n");
        assert_eq!(tokens[0], String("foo_bar".into()));
    }

    #[test]
    fn lowercase_letters_are_never_punctuation() {
        // `'`'..='~'` would wrongly cover a-z; `is_punct` must not do that.
        let tokens = lex("USER alice\r\n");
        assert_eq!(
            tokens,
            vec![Keyword(Keyword::User), Space, String("alice".into()), Crlf, Eof]
        );
        assert!(!tokens.iter().any(|t| matches!(t, Punct(_))));
    }
}
