/// FTP command keywords recognised by the lexer.
///
/// Matching is case-insensitive; see [`Keyword::from_identifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    User,
    Pass,
    Acct,
    Cwd,
    Cdup,
    Smnt,
    Rein,
    Quit,
    Port,
    Pasv,
    Type,
    Stru,
    Mode,
    Retr,
    Stor,
    Stou,
    Appe,
    Allo,
    Rest,
    Rnfr,
    Rnto,
    Abor,
    Dele,
    Rmd,
    Mkd,
    Pwd,
    List,
    Nlst,
    Site,
    Syst,
    Stat,
    Help,
    Noop,
}

impl Keyword {
    /// Looks up `ident` (already lower-cased) against the 33 recognised keywords.
    pub fn from_identifier(ident: &str) -> Option<Keyword> {
        use Keyword::*;

        Some(match ident {
            "user" => User,
            "pass" => Pass,
            "acct" => Acct,
            "cwd" => Cwd,
            "cdup" => Cdup,
            "smnt" => Smnt,
            "rein" => Rein,
            "quit" => Quit,
            "port" => Port,
            "pasv" => Pasv,
            "type" => Type,
            "stru" => Stru,
            "mode" => Mode,
            "retr" => Retr,
            "stor" => Stor,
            "stou" => Stou,
            "appe" => Appe,
            "allo" => Allo,
            "rest" => Rest,
            "rnfr" => Rnfr,
            "rnto" => Rnto,
            "abor" => Abor,
            "dele" => Dele,
            "rmd" => Rmd,
            "mkd" => Mkd,
            "pwd" => Pwd,
            "list" => List,
            "nlst" => Nlst,
            "site" => Site,
            "syst" => Syst,
            "stat" => Stat,
            "help" => Help,
            "noop" => Noop,
            _ => return None,
        })
    }
}

/// A single lexical unit of an FTP command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Punct(char),
    Comma,
    String(String),
    Space,
    Crlf,
    Eof,
    Keyword(Keyword),
}

/// `true` for `!"#$%&'()*+-./:;<=>?@[\]^\`{|}~`, i.e. ASCII punctuation minus `_`.
///
/// Mirrors the source lexer's `is_punct`: the ranges are `!`..`/`, `:`..`@`,
/// `[`..`^`, `{`..`~`, plus the lone backtick — NOT `` ` ``..`~`, which would
/// swallow every lowercase letter before the identifier branch ever saw it.
pub fn is_punct(c: char) -> bool {
    matches!(c, '!'..='/' | ':'..='@' | '['..='^' | '{'..='~' | '`')
}
