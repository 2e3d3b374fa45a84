//! A parser and writer for the serf save text format.
//!
//! The format is loosely based on braces `{}` and `key = value` assignments:
//!
//! ```text
//! serf = {
//!     index = 12
//!     state = walking
//!     direction1 = -2
//! }
//! ```
//!
//! Values are integers, bare identifiers or quoted strings. `#` starts a
//! comment that runs to the end of the line.

mod error;

pub use error::ParseError;

use std::fmt::Write as _;
use std::path::Path;

/// Represents a token scanned from save text.
#[derive(Debug, Clone, PartialEq)]
pub enum TxtToken {
    /// An alphanumeric identifier (keys, values).
    Identifier(String),
    /// A quoted string value.
    StringValue(String),
    /// An integer number.
    IntValue(i64),
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `=`
    Equals,
}

impl std::fmt::Display for TxtToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxtToken::Identifier(s) => write!(f, "{}", s),
            TxtToken::StringValue(s) => write!(f, "\"{}\"", s),
            TxtToken::IntValue(i) => write!(f, "{}", i),
            TxtToken::LeftBrace => write!(f, "{{"),
            TxtToken::RightBrace => write!(f, "}}"),
            TxtToken::Equals => write!(f, "="),
        }
    }
}

/// Represents an item in the parse tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TxtItem {
    /// A `key = value` assignment. Children are `[key, value]`.
    Assignment,
    /// A list of assignments or values (the file root or a braced block).
    AssignmentList,
    /// An identifier value.
    Identifier(String),
    /// A string value.
    StringValue(String),
    /// An integer value.
    IntValue(i64),
}

/// A node in the parse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TxtNode {
    /// Child nodes (for lists or assignments).
    pub children: Vec<TxtNode>,
    /// The type of item and its data.
    pub entry: TxtItem,
}

impl TxtNode {
    fn leaf(entry: TxtItem) -> TxtNode {
        TxtNode {
            children: Vec::new(),
            entry,
        }
    }

    /// Counts the total number of nodes in this subtree (inclusive).
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// For an assignment, the key identifier.
    pub fn key(&self) -> Option<&str> {
        match (&self.entry, self.children.first()) {
            (TxtItem::Assignment, Some(lhs)) => lhs.as_str(),
            _ => None,
        }
    }

    /// For an assignment, the right-hand side.
    pub fn value(&self) -> Option<&TxtNode> {
        match self.entry {
            TxtItem::Assignment => self.children.get(1),
            _ => None,
        }
    }

    /// First value assigned to `key` inside this list.
    pub fn get(&self, key: &str) -> Option<&TxtNode> {
        self.get_all(key).next()
    }

    /// All values assigned to `key` inside this list, in file order.
    pub fn get_all<'a, 'k>(&'a self, key: &'k str) -> impl Iterator<Item = &'a TxtNode> + 'k
    where
        'a: 'k,
    {
        self.children
            .iter()
            .filter(move |child| child.key() == Some(key))
            .filter_map(|child| child.value())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.entry {
            TxtItem::IntValue(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.entry {
            TxtItem::Identifier(s) | TxtItem::StringValue(s) => Some(s),
            _ => None,
        }
    }
}

pub trait SerfTxt {
    /// Reads and tokenizes a file.
    fn open_txt(path: &Path) -> std::io::Result<Vec<TxtToken>> {
        let contents = std::fs::read_to_string(path)?;
        Self::tokenize(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    fn tokenize(contents: &str) -> Result<Vec<TxtToken>, ParseError> {
        let mut tokens: Vec<TxtToken> = Vec::new();
        let mut chars = contents.char_indices().peekable();

        while let Some(&(offset, c)) = chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    chars.next();
                }
                '#' => {
                    // Comments are dropped
                    while let Some(&(_, nc)) = chars.peek() {
                        if nc == '\n' || nc == '\r' {
                            break;
                        }
                        chars.next();
                    }
                }
                '{' => {
                    tokens.push(TxtToken::LeftBrace);
                    chars.next();
                }
                '}' => {
                    tokens.push(TxtToken::RightBrace);
                    chars.next();
                }
                '=' => {
                    tokens.push(TxtToken::Equals);
                    chars.next();
                }
                '"' => {
                    chars.next(); // consume "
                    let mut s = String::new();
                    let mut closed = false;
                    while let Some((_, nc)) = chars.next() {
                        match nc {
                            '"' => {
                                closed = true;
                                break;
                            }
                            '\\' => match chars.next() {
                                Some((_, escaped)) => s.push(escaped),
                                None => break,
                            },
                            _ => s.push(nc),
                        }
                    }
                    if !closed {
                        return Err(ParseError::UnterminatedString { offset });
                    }
                    tokens.push(TxtToken::StringValue(s));
                }
                _ => {
                    // Identifier or Number
                    let mut s = String::new();
                    while let Some(&(_, nc)) = chars.peek() {
                        if nc.is_whitespace() || matches!(nc, '=' | '{' | '}' | '#' | '"') {
                            break;
                        }
                        s.push(nc);
                        chars.next();
                    }

                    if let Ok(i) = s.parse::<i64>() {
                        tokens.push(TxtToken::IntValue(i));
                    } else {
                        tokens.push(TxtToken::Identifier(s));
                    }
                }
            }
        }
        Ok(tokens)
    }

    fn parse_terminal(tokens: &[TxtToken], pos: usize) -> Result<(TxtNode, usize), ParseError> {
        let tok = tokens
            .get(pos)
            .ok_or(ParseError::UnexpectedEof { position: pos })?;
        let entry = match tok {
            TxtToken::Identifier(s) => TxtItem::Identifier(s.clone()),
            TxtToken::IntValue(i) => TxtItem::IntValue(*i),
            TxtToken::StringValue(s) => TxtItem::StringValue(s.clone()),
            _ => {
                return Err(ParseError::UnexpectedToken {
                    position: pos,
                    token: tok.to_string(),
                    expected: "a value".to_string(),
                });
            }
        };
        Ok((TxtNode::leaf(entry), pos + 1))
    }

    /// Parses list items starting at `pos`. When `nested` is set the list
    /// must end with `}`; otherwise it runs to the end of input.
    fn parse_assignment_list(
        tokens: &[TxtToken],
        pos: usize,
        nested: bool,
    ) -> Result<(TxtNode, usize), ParseError> {
        let mut list = TxtNode::leaf(TxtItem::AssignmentList);
        let mut loop_pos = pos;
        loop {
            let Some(lhs_tok) = tokens.get(loop_pos) else {
                if nested {
                    return Err(ParseError::UnexpectedEof { position: loop_pos });
                }
                break;
            };
            match lhs_tok {
                TxtToken::RightBrace => {
                    if !nested {
                        return Err(ParseError::UnbalancedBrace { position: loop_pos });
                    }
                    loop_pos += 1;
                    break;
                }
                TxtToken::LeftBrace => {
                    let (inner, next_pos) = Self::parse_assignment_list(tokens, loop_pos + 1, true)?;
                    list.children.push(inner);
                    loop_pos = next_pos;
                    continue;
                }
                TxtToken::Equals => {
                    return Err(ParseError::InvalidLhs {
                        position: loop_pos,
                        found: lhs_tok.to_string(),
                    });
                }
                _ => {}
            }

            let (node_lhs, eq_pos) = Self::parse_terminal(tokens, loop_pos)?;
            if tokens.get(eq_pos) != Some(&TxtToken::Equals) {
                // Loose value inside a list: { 1 2 3 }
                list.children.push(node_lhs);
                loop_pos = eq_pos;
                continue;
            }

            if !matches!(node_lhs.entry, TxtItem::Identifier(_)) {
                return Err(ParseError::InvalidLhs {
                    position: loop_pos,
                    found: tokens[loop_pos].to_string(),
                });
            }

            let rhs_tok = tokens
                .get(eq_pos + 1)
                .ok_or(ParseError::MissingRhs { position: eq_pos + 1 })?;
            let (node_rhs, next_pos) = match rhs_tok {
                TxtToken::LeftBrace => Self::parse_assignment_list(tokens, eq_pos + 2, true)?,
                TxtToken::RightBrace | TxtToken::Equals => {
                    return Err(ParseError::MissingRhs { position: eq_pos + 1 });
                }
                _ => Self::parse_terminal(tokens, eq_pos + 1)?,
            };

            let mut assignment = TxtNode::leaf(TxtItem::Assignment);
            assignment.children.push(node_lhs);
            assignment.children.push(node_rhs);
            list.children.push(assignment);
            loop_pos = next_pos;
        }
        Ok((list, loop_pos))
    }

    fn parse(tokens: Vec<TxtToken>) -> Result<TxtNode, ParseError> {
        if tokens.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        let (node, _) = Self::parse_assignment_list(&tokens, 0, false)?;
        Ok(node)
    }

    fn parse_str(contents: &str) -> Result<TxtNode, ParseError> {
        Self::parse(Self::tokenize(contents)?)
    }
}

pub struct DefaultSerfTxt {}
impl SerfTxt for DefaultSerfTxt {}

/// Builds save text with consistent indentation.
#[derive(Debug, Default)]
pub struct TxtWriter {
    out: String,
    depth: usize,
}

impl TxtWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
    }

    pub fn begin_block(&mut self, key: &str) -> &mut Self {
        self.indent();
        let _ = writeln!(self.out, "{} = {{", key);
        self.depth += 1;
        self
    }

    pub fn end_block(&mut self) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str("}\n");
        self
    }

    pub fn int(&mut self, key: &str, value: i64) -> &mut Self {
        self.indent();
        let _ = writeln!(self.out, "{} = {}", key, value);
        self
    }

    pub fn ident(&mut self, key: &str, value: &str) -> &mut Self {
        self.indent();
        let _ = writeln!(self.out, "{} = {}", key, value);
        self
    }

    pub fn string(&mut self, key: &str, value: &str) -> &mut Self {
        self.indent();
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        let _ = writeln!(self.out, "{} = \"{}\"", key, escaped);
        self
    }

    pub fn comment(&mut self, text: &str) -> &mut Self {
        self.indent();
        let _ = writeln!(self.out, "# {}", text);
        self
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent() {
        let r = DefaultSerfTxt::open_txt(Path::new("path/to/nowhere"));
        assert!(r.is_err());
    }

    #[test]
    fn tokenize_mixed() {
        let tokens = DefaultSerfTxt::tokenize("a = -2 # note\nb = \"x y\" c = { 1 }").unwrap();
        assert_eq!(
            tokens,
            vec![
                TxtToken::Identifier("a".into()),
                TxtToken::Equals,
                TxtToken::IntValue(-2),
                TxtToken::Identifier("b".into()),
                TxtToken::Equals,
                TxtToken::StringValue("x y".into()),
                TxtToken::Identifier("c".into()),
                TxtToken::Equals,
                TxtToken::LeftBrace,
                TxtToken::IntValue(1),
                TxtToken::RightBrace,
            ]
        );
    }

    #[test]
    fn unterminated_string() {
        let r = DefaultSerfTxt::tokenize("a = \"oops");
        assert_eq!(r, Err(ParseError::UnterminatedString { offset: 4 }));
    }

    #[test]
    fn empty_input() {
        assert_eq!(DefaultSerfTxt::parse_str("  # nothing"), Err(ParseError::EmptyInput));
    }

    #[test]
    fn unbalanced_brace() {
        assert!(matches!(
            DefaultSerfTxt::parse_str("a = 1 }"),
            Err(ParseError::UnbalancedBrace { .. })
        ));
        assert!(matches!(
            DefaultSerfTxt::parse_str("a = { b = 1"),
            Err(ParseError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn writer_output_parses_back() {
        let mut w = TxtWriter::new();
        w.begin_block("serf")
            .int("index", 3)
            .ident("state", "walking")
            .int("direction1", -2)
            .end_block();
        let text = w.finish();
        assert!(text.starts_with("serf = {\n    index = 3\n"));

        let root = DefaultSerfTxt::parse_str(&text).unwrap();
        let serf = root.get("serf").unwrap();
        assert_eq!(serf.get("index").and_then(TxtNode::as_int), Some(3));
        assert_eq!(serf.get("state").and_then(TxtNode::as_str), Some("walking"));
        assert_eq!(serf.get("direction1").and_then(TxtNode::as_int), Some(-2));
    }

    #[test]
    fn quoted_strings_round_trip() {
        let name = r#"the "old" mill \ north"#;
        let mut w = TxtWriter::new();
        w.string("name", name);
        let text = w.finish();
        assert_eq!(text, "name = \"the \\\"old\\\" mill \\\\ north\"\n");

        let root = DefaultSerfTxt::parse_str(&text).unwrap();
        assert_eq!(root.get("name").and_then(TxtNode::as_str), Some(name));
    }
}
