//! Import clause scanning.
//!
//! Reads just enough of a source file to list its imports: the package clause
//! followed by any number of `import` declarations, single or parenthesised.
//! Scanning stops at the first other declaration.

/// Pseudo-package for foreign-function bindings; never a real dependency.
const FOREIGN_PSEUDO_PACKAGE: &str = "C";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
  Ident(String),
  Str(String),
  Punct(char),
}

struct Lexer<'a> {
  chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
  fn new(source: &'a str) -> Self {
    Self {
      chars: source.chars().peekable(),
    }
  }

  /// Skip whitespace and comments.
  fn skip_trivia(&mut self) {
    loop {
      match self.chars.peek() {
        Some(c) if c.is_whitespace() => {
          self.chars.next();
        }
        Some('/') => {
          let mut ahead = self.chars.clone();
          ahead.next();
          match ahead.peek() {
            Some('/') => {
              for c in self.chars.by_ref() {
                if c == '\n' {
                  break;
                }
              }
            }
            Some('*') => {
              self.chars.next();
              self.chars.next();
              let mut prev = '\0';
              for c in self.chars.by_ref() {
                if prev == '*' && c == '/' {
                  break;
                }
                prev = c;
              }
            }
            _ => return,
          }
        }
        _ => return,
      }
    }
  }

  fn next_token(&mut self) -> Option<Token> {
    self.skip_trivia();
    let c = self.chars.next()?;

    if c == '"' {
      let mut value = String::new();
      while let Some(c) = self.chars.next() {
        match c {
          '"' | '\n' => break,
          '\\' => match self.chars.next() {
            Some('n') => value.push('\n'),
            Some('t') => value.push('\t'),
            Some(other) => value.push(other),
            None => break,
          },
          other => value.push(other),
        }
      }
      return Some(Token::Str(value));
    }

    if c == '`' {
      let value: String = self.chars.by_ref().take_while(|&c| c != '`').collect();
      return Some(Token::Str(value));
    }

    if c.is_alphabetic() || c == '_' {
      let mut ident = String::from(c);
      while let Some(&next) = self.chars.peek() {
        if next.is_alphanumeric() || next == '_' {
          ident.push(next);
          self.chars.next();
        } else {
          break;
        }
      }
      return Some(Token::Ident(ident));
    }

    Some(Token::Punct(c))
  }
}

/// Read one import spec (`[name|.|_] "path"`), starting at `first`.
fn import_spec(first: Token, lexer: &mut Lexer<'_>) -> Option<String> {
  match first {
    Token::Str(path) => Some(path),
    Token::Ident(_) | Token::Punct('.') => match lexer.next_token()? {
      Token::Str(path) => Some(path),
      _ => None,
    },
    _ => None,
  }
}

/// List the imports of one source file, in order of appearance.
pub fn scan_imports(source: &str) -> Vec<String> {
  let mut lexer = Lexer::new(source);
  let mut imports = Vec::new();

  // package clause
  match lexer.next_token() {
    Some(Token::Ident(kw)) if kw == "package" => {}
    _ => return imports,
  }
  if !matches!(lexer.next_token(), Some(Token::Ident(_))) {
    return imports;
  }

  while let Some(token) = lexer.next_token() {
    match token {
      Token::Punct(';') => continue,
      Token::Ident(kw) if kw == "import" => {}
      _ => break,
    }

    match lexer.next_token() {
      Some(Token::Punct('(')) => {
        while let Some(token) = lexer.next_token() {
          match token {
            Token::Punct(')') => break,
            Token::Punct(';') => continue,
            other => {
              if let Some(path) = import_spec(other, &mut lexer) {
                imports.push(path);
              }
            }
          }
        }
      }
      Some(other) => {
        if let Some(path) = import_spec(other, &mut lexer) {
          imports.push(path);
        }
      }
      None => break,
    }
  }

  imports
}

/// Merge the imports of several files, dropping duplicates and the foreign
/// pseudo-package while keeping first-seen order.
pub fn merge_imports<'a>(sources: impl IntoIterator<Item = &'a str>) -> Vec<String> {
  let mut seen = std::collections::HashSet::new();
  let mut merged = Vec::new();
  for source in sources {
    for path in scan_imports(source) {
      if path == FOREIGN_PSEUDO_PACKAGE || path.is_empty() {
        continue;
      }
      if seen.insert(path.clone()) {
        merged.push(path);
      }
    }
  }
  merged
}
