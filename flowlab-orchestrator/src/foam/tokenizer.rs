//! Lexer and cursor for ASCII dictionary files

use std::path::{Path, PathBuf};

use super::FoamError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Word(String),
    Number(f64),
    Str(String),
    Punct(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Word(w) => write!(f, "'{}'", w),
            Token::Number(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Punct(c) => write!(f, "'{}'", c),
        }
    }
}

fn is_punct(c: char) -> bool {
    matches!(c, '(' | ')' | '{' | '}' | '[' | ']' | ';')
}

/// Split `source` into tokens, dropping `//` and `/* */` comments
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '/' {
            let rest = &source[start..];
            if rest.starts_with("//") {
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
                continue;
            }
            if rest.starts_with("/*") {
                let Some(end) = rest[2..].find("*/") else {
                    return Err("unterminated block comment".to_string());
                };
                let stop = start + 2 + end + 2;
                while let Some(&(i, _)) = chars.peek() {
                    if i >= stop {
                        break;
                    }
                    chars.next();
                }
                continue;
            }
        }

        if is_punct(c) {
            tokens.push(Token::Punct(c));
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                if c == '"' {
                    closed = true;
                    break;
                }
                value.push(c);
            }
            if !closed {
                return Err("unterminated string".to_string());
            }
            tokens.push(Token::Str(value));
            continue;
        }

        let mut end = source.len();
        while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() || is_punct(c) || c == '"' {
                end = i;
                break;
            }
            chars.next();
        }
        let text = &source[start..end];

        let numeric_start = text
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
        match text.parse::<f64>() {
            Ok(n) if numeric_start => tokens.push(Token::Number(n)),
            _ => tokens.push(Token::Word(text.to_string())),
        }
    }

    Ok(tokens)
}

/// Cursor over the tokens of one file
pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    path: PathBuf,
}

impl Parser {
    /// Read and tokenize a file, consuming its `FoamFile` header
    pub(crate) fn open(path: &Path) -> Result<Self, FoamError> {
        let source = std::fs::read_to_string(path).map_err(|e| FoamError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut parser = Self::from_source(&source, path)?;
        parser.skip_header()?;
        Ok(parser)
    }

    pub(crate) fn from_source(source: &str, path: &Path) -> Result<Self, FoamError> {
        let tokens = tokenize(source).map_err(|message| FoamError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(Self {
            tokens,
            pos: 0,
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> FoamError {
        FoamError::Parse {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn next(&mut self) -> Result<Token, FoamError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of file"))?;
        self.pos += 1;
        Ok(token)
    }

    pub(crate) fn expect_punct(&mut self, expected: char) -> Result<(), FoamError> {
        match self.next()? {
            Token::Punct(c) if c == expected => Ok(()),
            other => Err(self.error(format!("expected '{}', found {}", expected, other))),
        }
    }

    pub(crate) fn at_punct(&self, c: char) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == c)
    }

    pub(crate) fn read_scalar(&mut self) -> Result<f64, FoamError> {
        match self.next()? {
            Token::Number(n) => Ok(n),
            Token::Word(w) if w.starts_with('$') => {
                Err(self.error(format!("macro expansion is not supported ({})", w)))
            }
            other => Err(self.error(format!("expected a number, found {}", other))),
        }
    }

    pub(crate) fn read_label(&mut self) -> Result<usize, FoamError> {
        let n = self.read_scalar()?;
        if n < 0.0 || n.fract() != 0.0 {
            return Err(self.error(format!("expected a non-negative integer, found {}", n)));
        }
        Ok(n as usize)
    }

    pub(crate) fn read_word(&mut self) -> Result<String, FoamError> {
        match self.next()? {
            Token::Word(w) | Token::Str(w) => Ok(w),
            other => Err(self.error(format!("expected a word, found {}", other))),
        }
    }

    /// `(x y z)`
    pub(crate) fn read_vector(&mut self) -> Result<[f64; 3], FoamError> {
        self.expect_punct('(')?;
        let v = [self.read_scalar()?, self.read_scalar()?, self.read_scalar()?];
        self.expect_punct(')')?;
        Ok(v)
    }

    /// Tokens not yet consumed
    pub(crate) fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }

    /// `N ( item ... )`, `N { item }` or an uncounted `( item ... )`.
    ///
    /// Counts are checked against what the file can hold before anything is
    /// allocated; a repeated `N { item }` may not exceed the tokens left either.
    pub(crate) fn read_list<T: Clone>(
        &mut self,
        item: impl FnMut(&mut Self) -> Result<T, FoamError>,
    ) -> Result<Vec<T>, FoamError> {
        let limit = self.remaining();
        self.read_list_within(limit, item)
    }

    /// Like [`Parser::read_list`], with `N { item }` allowed to repeat up to `limit` times
    pub(crate) fn read_list_within<T: Clone>(
        &mut self,
        limit: usize,
        mut item: impl FnMut(&mut Self) -> Result<T, FoamError>,
    ) -> Result<Vec<T>, FoamError> {
        if self.at_punct('(') {
            self.next()?;
            let mut items = Vec::new();
            while !self.at_punct(')') {
                items.push(item(self)?);
            }
            self.next()?;
            return Ok(items);
        }

        let count = self.read_label()?;
        if self.at_punct('{') {
            if count > limit {
                return Err(self.error(format!(
                    "uniform list of {} items exceeds the expected {}",
                    count, limit
                )));
            }
            self.next()?;
            let value = item(self)?;
            self.expect_punct('}')?;
            return Ok(vec![value; count]);
        }

        // Every item takes at least one token
        if count > self.remaining() {
            return Err(self.error(format!(
                "list claims {} items but only {} tokens remain",
                count,
                self.remaining()
            )));
        }
        self.expect_punct('(')?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(item(self)?);
        }
        self.expect_punct(')')?;
        Ok(items)
    }

    /// Move past the next top-level occurrence of `keyword`
    pub(crate) fn seek_keyword(&mut self, keyword: &str) -> bool {
        let mut depth = 0usize;
        while let Some(token) = self.tokens.get(self.pos) {
            match token {
                Token::Punct('{') | Token::Punct('(') => depth += 1,
                Token::Punct('}') | Token::Punct(')') => depth = depth.saturating_sub(1),
                Token::Word(w) if depth == 0 && w == keyword => {
                    self.pos += 1;
                    return true;
                }
                _ => {}
            }
            self.pos += 1;
        }
        false
    }

    /// Skip tokens up to and including the `;` closing the current entry,
    /// stepping over nested brackets
    pub(crate) fn skip_entry(&mut self) -> Result<(), FoamError> {
        let mut depth = 0usize;
        loop {
            match self.next()? {
                Token::Punct('{') | Token::Punct('(') | Token::Punct('[') => depth += 1,
                Token::Punct('}') | Token::Punct(')') | Token::Punct(']') => {
                    depth = depth.saturating_sub(1)
                }
                Token::Punct(';') if depth == 0 => return Ok(()),
                _ => {}
            }
        }
    }

    /// Skip the `FoamFile { ... }` header, rejecting binary files
    fn skip_header(&mut self) -> Result<(), FoamError> {
        if !matches!(self.peek(), Some(Token::Word(w)) if w == "FoamFile") {
            return Ok(());
        }
        self.next()?;
        self.expect_punct('{')?;
        while !self.at_punct('}') {
            let key = self.read_word()?;
            if key == "format" {
                let format = self.read_word()?;
                if format != "ascii" {
                    return Err(self.error(format!("unsupported file format '{}'", format)));
                }
                self.expect_punct(';')?;
            } else {
                self.skip_entry()?;
            }
        }
        self.next()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_comments() {
        let tokens = tokenize("a 1.5; // line\n/* block\n comment */ (b -2e-3)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("a".into()),
                Token::Number(1.5),
                Token::Punct(';'),
                Token::Punct('('),
                Token::Word("b".into()),
                Token::Number(-2e-3),
                Token::Punct(')'),
            ]
        );
    }

    #[test]
    fn test_tokenize_face_without_space() {
        let tokens = tokenize("4(0 1 2 3)").unwrap();
        assert_eq!(tokens[0], Token::Number(4.0));
        assert_eq!(tokens[1], Token::Punct('('));
        assert_eq!(tokens.len(), 7);
    }

    #[test]
    fn test_tokenize_type_words() {
        let tokens = tokenize("nonuniform List<vector> \"(inlet|outlet)\"").unwrap();
        assert_eq!(tokens[1], Token::Word("List<vector>".into()));
        assert_eq!(tokens[2], Token::Str("(inlet|outlet)".into()));
    }

    #[test]
    fn test_unterminated_comment() {
        assert!(tokenize("a /* never closed").is_err());
    }

    #[test]
    fn test_read_lists() {
        let path = Path::new("test");
        let mut p = Parser::from_source("3((0 0 0) (1 0 0) (0 1 0)) 2{(5 5 5)} (1 2)", path).unwrap();

        let points = p.read_list(|p| p.read_vector()).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[1], [1.0, 0.0, 0.0]);

        let repeated = p.read_list(|p| p.read_vector()).unwrap();
        assert_eq!(repeated, vec![[5.0, 5.0, 5.0]; 2]);

        let uncounted = p.read_list(|p| p.read_label()).unwrap();
        assert_eq!(uncounted, vec![1, 2]);
    }

    #[test]
    fn test_oversized_count_is_parse_error() {
        let path = Path::new("points");
        let mut p = Parser::from_source("1000000000000000\n(\n(0 0 0)\n)", path).unwrap();
        let err = p.read_list(|p| p.read_vector()).unwrap_err();
        assert!(matches!(err, FoamError::Parse { .. }));
        assert!(err.to_string().contains("1000000000000000"));

        let mut p = Parser::from_source("1000000000000000{(1 0 0)}", path).unwrap();
        assert!(p.read_list(|p| p.read_vector()).is_err());

        let mut p = Parser::from_source("9{(1 0 0)}", path).unwrap();
        assert!(p.read_list_within(8, |p| p.read_vector()).is_err());
        let mut p = Parser::from_source("8{(1 0 0)}", path).unwrap();
        assert_eq!(p.read_list_within(8, |p| p.read_vector()).unwrap().len(), 8);
    }

    #[test]
    fn test_binary_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points");
        std::fs::write(
            &path,
            "FoamFile { version 2.0; format binary; class vectorField; }\n3(...)",
        )
        .unwrap();

        let err = Parser::open(&path).err().unwrap();
        assert!(err.to_string().contains("binary"));
    }

    #[test]
    fn test_seek_keyword_top_level_only() {
        let path = Path::new("test");
        let mut p = Parser::from_source(
            "boundaryField { internalField x; } internalField uniform (1 2 3);",
            path,
        )
        .unwrap();

        assert!(p.seek_keyword("internalField"));
        assert_eq!(p.read_word().unwrap(), "uniform");
        assert_eq!(p.read_vector().unwrap(), [1.0, 2.0, 3.0]);
    }
}
