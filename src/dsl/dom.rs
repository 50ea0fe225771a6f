//! Article DOM: parses bracketed DSL markup into a tree of text and tag
//! nodes.
//!
//! The parser is total: unknown tags are preserved as tag nodes, excess
//! closers close the nearest open tag of that name or are dropped, and
//! unterminated markup is attached as written.

use log::warn;

/// One node of the parsed article tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Tag(TagNode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNode {
    pub name: String,
    /// Raw attribute string, exactly as written between the name and `]`.
    pub attrs: String,
    pub children: Vec<Node>,
}

impl TagNode {
    fn new(name: String, attrs: String) -> TagNode {
        TagNode {
            name,
            attrs,
            children: Vec::new(),
        }
    }

    /// Concatenate the text content of this subtree, dropping all markup.
    pub fn render_as_text(&self) -> String {
        let mut out = String::new();
        render_text_into(&self.children, &mut out);
        out
    }
}

fn render_text_into(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Tag(tag) => {
                if tag.name == "br" {
                    out.push('\n');
                } else {
                    render_text_into(&tag.children, out);
                }
            }
        }
    }
}

/// A parsed article body. The root node is an unnamed tag whose children
/// appear in source order.
#[derive(Debug)]
pub struct ArticleDom {
    pub root: TagNode,
}

impl ArticleDom {
    pub fn parse(text: &str) -> ArticleDom {
        let chars: Vec<char> = text.chars().collect();
        let mut stack: Vec<TagNode> = vec![TagNode::new(String::new(), String::new())];
        let mut i = 0;
        let mut at_line_start = true;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\\' => {
                    // Escaped character becomes literal text; the backslash
                    // is consumed here.
                    if let Some(&n) = chars.get(i + 1) {
                        push_text(&mut stack, n);
                        i += 2;
                    } else {
                        push_text(&mut stack, '\\');
                        i += 1;
                    }
                    at_line_start = false;
                }
                '[' => {
                    match scan_tag(&chars, i) {
                        Some((name, attrs, closing, after)) => {
                            if closing {
                                close_tag(&mut stack, &name);
                            } else if name == "br" {
                                // Void tag: attach immediately.
                                attach(&mut stack, Node::Tag(TagNode::new(name, attrs)));
                            } else {
                                stack.push(TagNode::new(name, attrs));
                            }
                            i = after;
                        }
                        None => {
                            // No closing bracket; keep the rest as text.
                            push_text(&mut stack, '[');
                            i += 1;
                        }
                    }
                    at_line_start = false;
                }
                '<' if chars.get(i + 1) == Some(&'<') => {
                    // <<word>> is shorthand for [ref]word[/ref].
                    match scan_until(&chars, i + 2, '>', '>') {
                        Some((inner, after)) => {
                            let mut reference = TagNode::new("ref".to_string(), String::new());
                            reference.children.push(Node::Text(inner));
                            attach(&mut stack, Node::Tag(reference));
                            i = after;
                        }
                        None => {
                            push_text(&mut stack, '<');
                            i += 1;
                        }
                    }
                    at_line_start = false;
                }
                '@' if at_line_start => {
                    // An embedded-card marker that survived into a body is
                    // kept as an `@` tag holding the rest of its line.
                    let mut end = i + 1;
                    while end < chars.len() && chars[end] != '\n' && chars[end] != '\r' {
                        end += 1;
                    }
                    let mut card = TagNode::new("@".to_string(), String::new());
                    let text: String = chars[i + 1..end].iter().collect();
                    card.children
                        .push(Node::Text(text.trim_matches(' ').to_string()));
                    attach(&mut stack, Node::Tag(card));
                    i = end;
                }
                '\n' | '\r' => {
                    push_text(&mut stack, c);
                    at_line_start = true;
                    i += 1;
                }
                ' ' | '\t' => {
                    push_text(&mut stack, c);
                    i += 1;
                }
                _ => {
                    push_text(&mut stack, c);
                    at_line_start = false;
                    i += 1;
                }
            }
        }

        // Attach any unclosed tags in order.
        while stack.len() > 1 {
            let node = stack.pop().expect("stack underflow");
            warn!("Unclosed [{}] tag in article", node.name);
            attach(&mut stack, Node::Tag(node));
        }

        ArticleDom {
            root: stack.pop().expect("root always present"),
        }
    }
}

/// Scan a `[name attrs]` or `[/name]` tag starting at the `[` position.
/// Returns `(name, attrs, closing, index after ']')`.
fn scan_tag(chars: &[char], open: usize) -> Option<(String, String, bool, usize)> {
    let close = chars[open + 1..].iter().position(|&c| c == ']')? + open + 1;
    let inner: String = chars[open + 1..close].iter().collect();
    let inner = inner.trim();

    let (closing, inner) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest.trim()),
        None => (false, inner),
    };

    let (name, attrs) = match inner.find(|c: char| c == ' ' || c == '\t') {
        Some(pos) => (inner[..pos].to_string(), inner[pos + 1..].trim().to_string()),
        None => (inner.to_string(), String::new()),
    };
    Some((name, attrs, closing, close + 1))
}

fn scan_until(chars: &[char], from: usize, a: char, b: char) -> Option<(String, usize)> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == a && chars[i + 1] == b {
            return Some((chars[from..i].iter().collect(), i + 2));
        }
        i += 1;
    }
    None
}

fn push_text(stack: &mut Vec<TagNode>, c: char) {
    let top = stack.last_mut().expect("stack never empty");
    if let Some(Node::Text(t)) = top.children.last_mut() {
        t.push(c);
    } else {
        top.children.push(Node::Text(c.to_string()));
    }
}

fn attach(stack: &mut Vec<TagNode>, node: Node) {
    stack
        .last_mut()
        .expect("stack never empty")
        .children
        .push(node);
}

/// Close the nearest open tag named `name`. Tags opened after it are
/// closed implicitly; a closer with no matching open tag is dropped.
fn close_tag(stack: &mut Vec<TagNode>, name: &str) {
    let position = stack.iter().rposition(|tag| tag.name == name);
    match position {
        Some(pos) if pos > 0 => {
            while stack.len() > pos {
                let node = stack.pop().expect("stack underflow");
                attach(stack, Node::Tag(node));
            }
        }
        _ => {} // Dropped: no matching open tag.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag<'a>(node: &'a Node) -> &'a TagNode {
        match node {
            Node::Tag(t) => t,
            Node::Text(t) => panic!("expected tag, got text {:?}", t),
        }
    }

    #[test]
    fn plain_text_is_one_node() {
        let dom = ArticleDom::parse("just text");
        assert_eq!(dom.root.children, vec![Node::Text("just text".to_string())]);
    }

    #[test]
    fn simple_tag_with_children() {
        let dom = ArticleDom::parse("The [i]cat[/i].");
        assert_eq!(dom.root.children.len(), 3);
        let italic = tag(&dom.root.children[1]);
        assert_eq!(italic.name, "i");
        assert_eq!(italic.children, vec![Node::Text("cat".to_string())]);
    }

    #[test]
    fn attributes_are_kept_raw() {
        let dom = ArticleDom::parse("[c mediumblue]sea[/c]");
        let color = tag(&dom.root.children[0]);
        assert_eq!(color.name, "c");
        assert_eq!(color.attrs, "mediumblue");
    }

    #[test]
    fn escaped_brackets_are_literal() {
        let dom = ArticleDom::parse(r"a \[not a tag\] b");
        assert_eq!(
            dom.root.children,
            vec![Node::Text("a [not a tag] b".to_string())]
        );
    }

    #[test]
    fn cross_reference_shorthand() {
        let dom = ArticleDom::parse("see <<other word>>");
        let reference = tag(&dom.root.children[1]);
        assert_eq!(reference.name, "ref");
        assert_eq!(reference.children, vec![Node::Text("other word".to_string())]);
    }

    #[test]
    fn unknown_tags_are_preserved() {
        let dom = ArticleDom::parse("[weird x=1]content[/weird]");
        let unknown = tag(&dom.root.children[0]);
        assert_eq!(unknown.name, "weird");
        assert_eq!(unknown.attrs, "x=1");
        assert_eq!(unknown.render_as_text(), "content");
    }

    #[test]
    fn excess_closer_is_dropped() {
        let dom = ArticleDom::parse("text[/b]more");
        assert_eq!(dom.root.render_as_text(), "textmore");
    }

    #[test]
    fn closer_reaches_past_inner_tags() {
        // [/m] closes [m1] even though [b] is still open.
        let dom = ArticleDom::parse("[m1][b]bold[/m1]after");
        let m = tag(&dom.root.children[0]);
        assert_eq!(m.name, "m1");
        let b = tag(&m.children[0]);
        assert_eq!(b.name, "b");
        assert_eq!(dom.root.children[1], Node::Text("after".to_string()));
    }

    #[test]
    fn br_is_void() {
        let dom = ArticleDom::parse("a[br]b");
        assert_eq!(dom.root.children.len(), 3);
        assert_eq!(tag(&dom.root.children[1]).name, "br");
        assert_eq!(dom.root.children[2], Node::Text("b".to_string()));
    }

    #[test]
    fn unclosed_tag_is_attached() {
        let dom = ArticleDom::parse("[b]dangling");
        let b = tag(&dom.root.children[0]);
        assert_eq!(b.name, "b");
        assert_eq!(b.render_as_text(), "dangling");
    }

    #[test]
    fn at_sign_line_becomes_card_node() {
        let dom = ArticleDom::parse("line one\n@ card head\nline two");
        let card_pos = dom
            .root
            .children
            .iter()
            .position(|n| matches!(n, Node::Tag(t) if t.name == "@"))
            .expect("card node");
        let card = tag(&dom.root.children[card_pos]);
        assert_eq!(card.render_as_text(), "card head");
    }

    #[test]
    fn render_as_text_drops_markup() {
        let dom = ArticleDom::parse("[m1][trn]to [i]run[/i][/trn][/m1]");
        assert_eq!(dom.root.render_as_text(), "to run");
    }
}
