//! User-supplied document skeletons in the pandoc template dialect.
//!
//! Supported: `$name$`, `$if(name)$ .. $else$ .. $endif$`,
//! `$for(name)$ .. $sep$ .. $endfor$`, `$$` for a literal dollar and
//! `$--` line comments. Every value is a scalar, so a `for` block renders
//! at most once and its separator never appears.

use std::collections::BTreeMap;

use crate::error::Error;

#[derive(Debug, PartialEq)]
enum Node<'t> {
    Text(&'t str),
    Var(&'t str),
    If {
        name: &'t str,
        then: Vec<Node<'t>>,
        otherwise: Vec<Node<'t>>,
    },
    For {
        name: &'t str,
        body: Vec<Node<'t>>,
    },
}

#[derive(Debug, PartialEq)]
enum Tag<'t> {
    Var(&'t str),
    If(&'t str),
    Else,
    EndIf,
    For(&'t str),
    Sep,
    EndFor,
}

enum Piece<'t> {
    Text(&'t str),
    Tag(Tag<'t>),
}

#[derive(Debug)]
pub(super) struct Template<'t> {
    nodes: Vec<Node<'t>>,
}

impl<'t> Template<'t> {
    pub(super) fn parse(source: &'t str) -> Result<Self, Error> {
        let mut parser = Parser { rest: source };
        let (nodes, end) = parser.block()?;
        if let Some(tag) = end {
            return Err(Error::Template(format!("unexpected {}", tag_name(&tag))));
        }
        if !mentions_body(&nodes) {
            return Err(Error::Template("no $body$ placeholder".into()));
        }
        Ok(Self { nodes })
    }

    /// Fill the template. Variables absent from `vars` render empty and are
    /// returned by name, once each.
    pub(super) fn render(&self, vars: &BTreeMap<&str, String>) -> (String, Vec<String>) {
        let mut out = String::new();
        let mut unknown = Vec::new();
        render_nodes(&self.nodes, vars, &mut out, &mut unknown);
        (out, unknown)
    }
}

fn render_nodes(
    nodes: &[Node<'_>],
    vars: &BTreeMap<&str, String>,
    out: &mut String,
    unknown: &mut Vec<String>,
) {
    let truthy = |name: &str| vars.get(name).is_some_and(|value| !value.is_empty());
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(name) => match vars.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    if !unknown.iter().any(|seen| seen == name) {
                        unknown.push(name.to_string());
                    }
                }
            },
            Node::If {
                name,
                then,
                otherwise,
            } => {
                let branch = if truthy(name) { then } else { otherwise };
                render_nodes(branch, vars, out, unknown);
            }
            Node::For { name, body } => {
                if truthy(name) {
                    render_nodes(body, vars, out, unknown);
                }
            }
        }
    }
}

fn mentions_body(nodes: &[Node<'_>]) -> bool {
    nodes.iter().any(|node| match node {
        Node::Var(name) => *name == "body",
        Node::If {
            then, otherwise, ..
        } => mentions_body(then) || mentions_body(otherwise),
        Node::For { body, .. } => mentions_body(body),
        Node::Text(_) => false,
    })
}

fn tag_name(tag: &Tag<'_>) -> String {
    match tag {
        Tag::Var(name) => format!("${name}$"),
        Tag::If(name) => format!("$if({name})$"),
        Tag::Else => "$else$".into(),
        Tag::EndIf => "$endif$".into(),
        Tag::For(name) => format!("$for({name})$"),
        Tag::Sep => "$sep$".into(),
        Tag::EndFor => "$endfor$".into(),
    }
}

struct Parser<'t> {
    rest: &'t str,
}

impl<'t> Parser<'t> {
    /// Nodes up to the next closing tag (returned) or the end of input.
    fn block(&mut self) -> Result<(Vec<Node<'t>>, Option<Tag<'t>>), Error> {
        let mut nodes = Vec::new();
        while let Some(piece) = self.piece()? {
            let tag = match piece {
                Piece::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Piece::Tag(tag) => tag,
            };
            match tag {
                Tag::Var(name) => nodes.push(Node::Var(name)),
                Tag::If(name) => {
                    let (then, end) = self.block()?;
                    let otherwise = match end {
                        Some(Tag::EndIf) => Vec::new(),
                        Some(Tag::Else) => match self.block()? {
                            (otherwise, Some(Tag::EndIf)) => otherwise,
                            (_, end) => return Err(unclosed("if", name, end)),
                        },
                        end => return Err(unclosed("if", name, end)),
                    };
                    nodes.push(Node::If {
                        name,
                        then,
                        otherwise,
                    });
                }
                Tag::For(name) => {
                    let (body, end) = self.block()?;
                    match end {
                        Some(Tag::EndFor) => {}
                        // a scalar never needs its separator
                        Some(Tag::Sep) => match self.block()? {
                            (_, Some(Tag::EndFor)) => {}
                            (_, end) => return Err(unclosed("for", name, end)),
                        },
                        end => return Err(unclosed("for", name, end)),
                    }
                    nodes.push(Node::For { name, body });
                }
                closing => return Ok((nodes, Some(closing))),
            }
        }
        Ok((nodes, None))
    }

    fn piece(&mut self) -> Result<Option<Piece<'t>>, Error> {
        if self.rest.is_empty() {
            return Ok(None);
        }
        let Some(start) = self.rest.find('$') else {
            let text = self.rest;
            self.rest = "";
            return Ok(Some(Piece::Text(text)));
        };
        if start > 0 {
            let (text, rest) = self.rest.split_at(start);
            self.rest = rest;
            return Ok(Some(Piece::Text(text)));
        }

        let after = &self.rest[1..];
        if let Some(rest) = after.strip_prefix('$') {
            let (dollar, _) = self.rest.split_at(1);
            self.rest = rest;
            return Ok(Some(Piece::Text(dollar)));
        }
        if let Some(comment) = after.strip_prefix("--") {
            self.rest = comment.find('\n').map_or("", |end| &comment[end + 1..]);
            return self.piece();
        }
        let Some(end) = after.find('$') else {
            return Err(Error::Template(format!(
                "unterminated placeholder near {:?}",
                truncate(after)
            )));
        };
        let inner = &after[..end];
        self.rest = &after[end + 1..];
        parse_tag(inner).map(|tag| Some(Piece::Tag(tag)))
    }
}

fn parse_tag(inner: &str) -> Result<Tag<'_>, Error> {
    let tag = match inner {
        "else" => Tag::Else,
        "endif" => Tag::EndIf,
        "sep" => Tag::Sep,
        "endfor" => Tag::EndFor,
        _ => {
            if let Some(name) = call(inner, "if") {
                Tag::If(name)
            } else if let Some(name) = call(inner, "for") {
                Tag::For(name)
            } else if is_name(inner) {
                Tag::Var(inner)
            } else {
                return Err(Error::Template(format!(
                    "invalid placeholder ${}$ (write $$ for a dollar sign)",
                    truncate(inner)
                )));
            }
        }
    };
    Ok(tag)
}

fn call<'t>(inner: &'t str, keyword: &str) -> Option<&'t str> {
    let name = inner
        .strip_prefix(keyword)?
        .strip_prefix('(')?
        .strip_suffix(')')?;
    is_name(name).then_some(name)
}

fn is_name(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_alphabetic())
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn truncate(s: &str) -> &str {
    s.char_indices().nth(24).map_or(s, |(end, _)| &s[..end])
}

fn unclosed(keyword: &str, name: &str, end: Option<Tag<'_>>) -> Error {
    let found = end.map_or_else(|| "end of template".to_string(), |tag| tag_name(&tag));
    Error::Template(format!("${keyword}({name})$ is not closed (found {found})"))
}
