//! Flowchart subset of the Mermaid language: text in, graph IR out.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error on line {line}: {message}")]
pub struct DiagramError {
    pub line: usize,
    pub message: String,
}

impl DiagramError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self { line, message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    TB,
    BT,
    LR,
    RL,
}

impl Direction {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "TB" | "TD" => Some(Direction::TB),
            "BT" => Some(Direction::BT),
            "LR" => Some(Direction::LR),
            "RL" => Some(Direction::RL),
            _ => None,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::LR | Direction::RL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeShape {
    Rect,
    Rounded,
    Stadium,
    Subroutine,
    Cylinder,
    Circle,
    DoubleCircle,
    Asymmetric,
    Diamond,
    Hexagon,
    Parallelogram,
    ParallelogramAlt,
    Trapezoid,
    TrapezoidAlt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub shape: NodeShape,
    pub subgraph: Option<usize>,
    pub classes: Vec<String>,
    /// Inline `style` declarations; these override class styles.
    pub style: NodeStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subgraph {
    pub id: String,
    pub title: String,
    pub parent: Option<usize>,
    pub direction: Option<Direction>,
    pub style: NodeStyle,
}

/// Presentation properties from `classDef` and `style` statements. Only values made of
/// plain color, length and dash characters are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeStyle {
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: Option<String>,
    pub stroke_dasharray: Option<String>,
    pub color: Option<String>,
}

impl NodeStyle {
    fn parse(declarations: &str) -> Self {
        let mut style = NodeStyle::default();
        for declaration in split_declarations(declarations) {
            let Some((key, value)) = declaration.split_once(':') else { continue };
            let value = value.trim();
            let safe = value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '#' | '.' | '%' | ' ' | '-' | '(' | ')' | ','));
            if value.is_empty() || !safe {
                continue;
            }
            let slot = match key.trim() {
                "fill" => &mut style.fill,
                "stroke" => &mut style.stroke,
                "stroke-width" => &mut style.stroke_width,
                "stroke-dasharray" => &mut style.stroke_dasharray,
                "color" => &mut style.color,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }
        style
    }

    /// Overlay `other`; its set properties win.
    pub fn merge(&mut self, other: &NodeStyle) {
        let pairs = [
            (&mut self.fill, &other.fill),
            (&mut self.stroke, &other.stroke),
            (&mut self.stroke_width, &other.stroke_width),
            (&mut self.stroke_dasharray, &other.stroke_dasharray),
            (&mut self.color, &other.color),
        ];
        for (mine, theirs) in pairs {
            if theirs.is_some() {
                mine.clone_from(theirs);
            }
        }
    }
}

/// `fill:#f96,stroke:rgb(1,2,3)` split on commas outside parentheses.
fn split_declarations(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let (mut depth, mut start) = (0i32, 0);
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth <= 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EdgeStyle {
    Solid,
    Dotted,
    Thick,
    Invisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArrowHead {
    None,
    Arrow,
    Circle,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endpoint {
    Node(usize),
    Subgraph(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: Endpoint,
    pub to: Endpoint,
    pub label: Option<String>,
    pub style: EdgeStyle,
    pub head: ArrowHead,
    pub tail: ArrowHead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flowchart {
    pub direction: Direction,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub subgraphs: Vec<Subgraph>,
    pub class_defs: BTreeMap<String, NodeStyle>,
}

impl Flowchart {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// `classDef default`, then the node's classes in order, then its inline style.
    pub fn resolved_style(&self, node: usize) -> NodeStyle {
        let node = &self.nodes[node];
        let mut style = self.class_defs.get("default").cloned().unwrap_or_default();
        for class in &node.classes {
            if let Some(def) = self.class_defs.get(class) {
                style.merge(def);
            }
        }
        style.merge(&node.style);
        style
    }

    /// Nesting depth of a subgraph, 0 for top-level ones.
    pub fn depth(&self, subgraph: usize) -> usize {
        let mut depth = 0;
        let mut current = self.subgraphs[subgraph].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.subgraphs[parent].parent;
        }
        depth
    }

    /// Chain of subgraphs from the outermost down to the one holding `node`.
    pub fn ancestry(&self, node: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = self.nodes[node].subgraph;
        while let Some(sg) = current {
            chain.push(sg);
            current = self.subgraphs[sg].parent;
        }
        chain.reverse();
        chain
    }
}

struct Link {
    style: EdgeStyle,
    head: ArrowHead,
    tail: ArrowHead,
    label: Option<String>,
}

#[derive(Default)]
struct Parser {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    subgraphs: Vec<Subgraph>,
    class_defs: BTreeMap<String, NodeStyle>,
    // (id, class) from `class` statements, applied once every node is known
    class_assignments: Vec<(String, String)>,
    inline_styles: Vec<(String, NodeStyle)>,
    node_index: HashMap<String, usize>,
    subgraph_index: HashMap<String, usize>,
    // (subgraph, line where it was opened)
    open: Vec<(usize, usize)>,
    references: Vec<(String, usize)>,
    link_styles: Vec<(usize, usize)>,
}

/// Parse a flowchart description.
pub fn parse_flowchart(source: &str) -> Result<Flowchart, DiagramError> {
    let lines = strip_fences(source);
    let mut statements = lines
        .into_iter()
        .flat_map(|(line_no, text)| split_statements(text).into_iter().map(move |s| (line_no, s)))
        .filter(|(_, s)| !s.is_empty());

    let (header_line, header) = statements
        .next()
        .ok_or_else(|| DiagramError::new(1, "diagram is empty"))?;
    let mut direction = parse_header(header, header_line)?;

    let mut parser = Parser::default();
    for (line, statement) in statements {
        if let Some(root_direction) = parser.statement(statement, line)? {
            direction = root_direction;
        }
    }
    parser.finish(direction)
}

/// Drops comments, front matter and a surrounding markdown fence. Yields 1-based line
/// numbers of the original text.
fn strip_fences(source: &str) -> Vec<(usize, &str)> {
    let mut lines: Vec<(usize, &str)> = source
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
        .collect();

    if lines.first().is_some_and(|(_, l)| l.starts_with("```")) {
        warn!("diagram wrapped in a markdown fence; stripping it");
        lines.remove(0);
        if lines.last().is_some_and(|(_, l)| l.starts_with("```")) {
            lines.pop();
        }
    }

    if lines.first().is_some_and(|(_, l)| *l == "---") {
        if let Some(close) = lines.iter().skip(1).position(|(_, l)| *l == "---") {
            lines.drain(..close + 2);
        }
    }

    lines.retain(|(_, l)| !l.starts_with("%%"));
    lines
}

/// Split on `;` outside of brackets, quotes and pipes.
fn split_statements(line: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut piped = false;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '|' if !quoted => piped = !piped,
            '[' | '(' | '{' if !quoted => depth += 1,
            ']' | ')' | '}' if !quoted => depth -= 1,
            ';' if !quoted && !piped && depth <= 0 => {
                parts.push(line[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(line[start..].trim());
    parts
}

fn parse_header(header: &str, line: usize) -> Result<Direction, DiagramError> {
    let mut words = header.split_whitespace();
    let keyword = words.next().unwrap_or_default();
    if keyword != "flowchart" && keyword != "graph" {
        return Err(DiagramError::new(
            line,
            format!("unsupported diagram type `{keyword}`; expected `flowchart` or `graph`"),
        ));
    }
    match words.next() {
        None => Ok(Direction::TB),
        Some(word) => Direction::parse(word).ok_or_else(|| {
            DiagramError::new(line, format!("unknown direction `{word}`; expected TB, TD, BT, LR or RL"))
        }),
    }
}

fn strip_keyword<'a>(statement: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = statement.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

impl Parser {
    /// Handles one statement. Returns a direction when a root-level `direction` line
    /// changes the chart's orientation.
    fn statement(&mut self, statement: &str, line: usize) -> Result<Option<Direction>, DiagramError> {
        if statement == "end" {
            return match self.open.pop() {
                Some(_) => Ok(None),
                None => Err(DiagramError::new(line, "`end` without a matching `subgraph`")),
            };
        }
        if let Some(rest) = strip_keyword(statement, "subgraph") {
            self.open_subgraph(rest, line);
            return Ok(None);
        }
        if let Some(rest) = strip_keyword(statement, "direction") {
            let word = rest.split_whitespace().next().unwrap_or_default();
            let direction = Direction::parse(word).ok_or_else(|| {
                DiagramError::new(line, format!("unknown direction `{word}`; expected TB, TD, BT, LR or RL"))
            })?;
            return match self.open.last() {
                Some(&(sg, _)) => {
                    self.subgraphs[sg].direction = Some(direction);
                    Ok(None)
                }
                None => Ok(Some(direction)),
            };
        }
        if let Some(rest) = strip_keyword(statement, "classDef") {
            let (names, declarations) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let style = NodeStyle::parse(declarations);
            for name in names.split(',').filter(|n| !n.is_empty()) {
                self.class_defs.entry(name.to_string()).or_default().merge(&style);
            }
            return Ok(None);
        }
        if let Some(rest) = strip_keyword(statement, "class") {
            let mut words = rest.split_whitespace();
            let ids = words.next().unwrap_or_default();
            let class = words.next().ok_or_else(|| DiagramError::new(line, "`class` needs node ids and a class name"))?;
            for id in ids.split(',').filter(|id| !id.is_empty()) {
                self.references.push((id.to_string(), line));
                self.class_assignments.push((id.to_string(), class.to_string()));
            }
            return Ok(None);
        }
        if let Some(rest) = strip_keyword(statement, "style") {
            let (id, declarations) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if id.is_empty() {
                return Err(DiagramError::new(line, "missing node id"));
            }
            self.references.push((id.to_string(), line));
            self.inline_styles.push((id.to_string(), NodeStyle::parse(declarations)));
            return Ok(None);
        }
        if let Some(rest) = strip_keyword(statement, "click") {
            let id = rest.split_whitespace().next().unwrap_or_default();
            if id.is_empty() {
                return Err(DiagramError::new(line, "missing node id"));
            }
            self.references.push((id.to_string(), line));
            return Ok(None);
        }
        if let Some(rest) = strip_keyword(statement, "linkStyle") {
            let targets = rest.split_whitespace().next().unwrap_or_default();
            if targets != "default" {
                for index in targets.split(',') {
                    let index: usize = index.parse().map_err(|_| {
                        DiagramError::new(line, format!("invalid linkStyle index `{index}`"))
                    })?;
                    self.link_styles.push((index, line));
                }
            }
            return Ok(None);
        }
        if statement.starts_with("accTitle") || statement.starts_with("accDescr") {
            return Ok(None);
        }
        self.chain(statement, line)?;
        Ok(None)
    }

    fn open_subgraph(&mut self, rest: &str, line: usize) {
        let generated = || format!("subGraph{}", self.subgraphs.len());
        let (id, title) = if rest.is_empty() {
            (generated(), String::new())
        } else if let Some(open) = rest.find('[') {
            let id = rest[..open].trim().to_string();
            let title = clean_label(rest[open + 1..].trim_end().trim_end_matches(']'));
            let id = if id.is_empty() { generated() } else { id };
            (id, title)
        } else if rest.starts_with('"') {
            (generated(), clean_label(rest))
        } else {
            (rest.to_string(), rest.to_string())
        };

        let index = self.subgraphs.len();
        self.subgraphs.push(Subgraph {
            id: id.clone(),
            title,
            parent: self.open.last().map(|&(sg, _)| sg),
            direction: None,
            style: NodeStyle::default(),
        });
        self.subgraph_index.insert(id, index);
        self.open.push((index, line));
    }

    /// `A[x] & B --> C -.->|y| D`
    fn chain(&mut self, statement: &str, line: usize) -> Result<(), DiagramError> {
        let mut rest = statement.trim();
        let mut pending: Option<(Vec<Endpoint>, Link)> = None;
        loop {
            let (group, after) = self.group(rest, line)?;
            if let Some((sources, link)) = pending.take() {
                for &from in &sources {
                    for &to in &group {
                        self.edges.push(Edge {
                            from,
                            to,
                            label: link.label.clone(),
                            style: link.style,
                            head: link.head,
                            tail: link.tail,
                        });
                    }
                }
            }
            rest = after.trim_start();
            if rest.is_empty() {
                return Ok(());
            }
            let (link, after) = parse_link(rest).ok_or_else(|| {
                DiagramError::new(line, format!("unexpected `{}`; expected a link such as `-->`", preview(rest)))
            })?;
            rest = after.trim_start();
            if rest.is_empty() {
                return Err(DiagramError::new(line, "link has no target node"));
            }
            pending = Some((group, link));
        }
    }

    fn group<'a>(&mut self, text: &'a str, line: usize) -> Result<(Vec<Endpoint>, &'a str), DiagramError> {
        let mut endpoints = Vec::new();
        let (first, mut rest) = self.node_ref(text, line)?;
        endpoints.push(first);
        while let Some(after) = rest.trim_start().strip_prefix('&') {
            let (next, after) = self.node_ref(after.trim_start(), line)?;
            endpoints.push(next);
            rest = after;
        }
        Ok((endpoints, rest))
    }

    fn node_ref<'a>(&mut self, text: &'a str, line: usize) -> Result<(Endpoint, &'a str), DiagramError> {
        let id_len = id_length(text);
        if id_len == 0 {
            return Err(DiagramError::new(line, format!("expected a node id, found `{}`", preview(text))));
        }
        let id = &text[..id_len];
        let mut rest = &text[id_len..];

        let shaped = match parse_shape(rest) {
            ShapeScan::None => None,
            ShapeScan::Found { label, shape, rest: after } => {
                rest = after;
                Some((label, shape))
            }
            ShapeScan::Unmatched(opener) => {
                return Err(DiagramError::new(line, format!("unmatched `{opener}` in node `{id}`")));
            }
        };

        let mut class = None;
        if let Some(after) = rest.strip_prefix(":::") {
            let len = id_length(after);
            class = Some(after[..len].to_string());
            rest = &after[len..];
        }

        Ok((self.touch(id, shaped, class), rest))
    }

    fn touch(&mut self, id: &str, shaped: Option<(String, NodeShape)>, class: Option<String>) -> Endpoint {
        if shaped.is_none() && !self.node_index.contains_key(id) {
            if let Some(&sg) = self.subgraph_index.get(id) {
                return Endpoint::Subgraph(sg);
            }
        }
        let current = self.open.last().map(|&(sg, _)| sg);
        let index = match self.node_index.get(id) {
            Some(&index) => index,
            None => {
                let index = self.nodes.len();
                self.nodes.push(Node {
                    id: id.to_string(),
                    label: id.to_string(),
                    shape: NodeShape::Rect,
                    subgraph: None,
                    classes: Vec::new(),
                    style: NodeStyle::default(),
                });
                self.node_index.insert(id.to_string(), index);
                index
            }
        };
        let node = &mut self.nodes[index];
        if node.subgraph.is_none() {
            node.subgraph = current;
        }
        if let Some((label, shape)) = shaped {
            node.label = if label.is_empty() { id.to_string() } else { label };
            node.shape = shape;
        }
        if let Some(class) = class {
            node.classes.push(class);
        }
        Endpoint::Node(index)
    }

    fn finish(mut self, direction: Direction) -> Result<Flowchart, DiagramError> {
        if let Some(&(sg, line)) = self.open.last() {
            return Err(DiagramError::new(
                line,
                format!("subgraph `{}` is never closed (missing `end`)", self.subgraphs[sg].id),
            ));
        }
        for (id, line) in &self.references {
            if !self.node_index.contains_key(id) && !self.subgraph_index.contains_key(id) {
                return Err(DiagramError::new(*line, format!("unknown node reference `{id}`")));
            }
        }
        for &(index, line) in &self.link_styles {
            if index >= self.edges.len() {
                return Err(DiagramError::new(
                    line,
                    format!("linkStyle index {index} out of range; diagram has {} links", self.edges.len()),
                ));
            }
        }
        for (id, class) in std::mem::take(&mut self.class_assignments) {
            if let Some(&n) = self.node_index.get(&id) {
                self.nodes[n].classes.push(class);
            }
        }
        for (id, style) in std::mem::take(&mut self.inline_styles) {
            if let Some(&n) = self.node_index.get(&id) {
                self.nodes[n].style.merge(&style);
            } else if let Some(&sg) = self.subgraph_index.get(&id) {
                self.subgraphs[sg].style.merge(&style);
            }
        }
        Ok(Flowchart {
            direction,
            nodes: self.nodes,
            edges: self.edges,
            subgraphs: self.subgraphs,
            class_defs: self.class_defs,
        })
    }
}

fn preview(text: &str) -> String {
    text.chars().take(24).collect()
}

/// Byte length of the node id at the start of `text`. A `-` belongs to the id only when
/// followed by another id character, so `A-->B` splits before the link.
fn id_length(text: &str) -> usize {
    let mut chars = text.char_indices().peekable();
    let mut end = 0;
    while let Some((i, c)) = chars.next() {
        let next_is_id = chars.peek().is_some_and(|&(_, n)| n.is_alphanumeric() || n == '_');
        let ok = c.is_alphanumeric() || c == '_' || (c == '-' && end > 0 && next_is_id);
        if !ok {
            break;
        }
        end = i + c.len_utf8();
    }
    end
}

enum ShapeScan<'a> {
    None,
    Found { label: String, shape: NodeShape, rest: &'a str },
    Unmatched(&'static str),
}

// Longest openers first; an opener may accept more than one closer.
const SHAPES: &[(&str, &[(&str, NodeShape)])] = &[
    ("(((", &[(")))", NodeShape::DoubleCircle)]),
    ("((", &[("))", NodeShape::Circle)]),
    ("([", &[("])", NodeShape::Stadium)]),
    ("[[", &[("]]", NodeShape::Subroutine)]),
    ("[(", &[(")]", NodeShape::Cylinder)]),
    ("{{", &[("}}", NodeShape::Hexagon)]),
    ("[/", &[("/]", NodeShape::Parallelogram), ("\\]", NodeShape::Trapezoid)]),
    ("[\\", &[("\\]", NodeShape::ParallelogramAlt), ("/]", NodeShape::TrapezoidAlt)]),
    ("[", &[("]", NodeShape::Rect)]),
    ("(", &[(")", NodeShape::Rounded)]),
    ("{", &[("}", NodeShape::Diamond)]),
    (">", &[("]", NodeShape::Asymmetric)]),
];

fn parse_shape(text: &str) -> ShapeScan<'_> {
    let mut unmatched = None;
    for (opener, closers) in SHAPES {
        let Some(body) = text.strip_prefix(opener) else { continue };
        if let Some((label, shape, rest)) = find_closer(body, closers) {
            return ShapeScan::Found { label, shape, rest };
        }
        unmatched.get_or_insert(*opener);
    }
    match unmatched {
        Some(opener) => ShapeScan::Unmatched(opener),
        None => ShapeScan::None,
    }
}

fn find_closer<'a>(body: &'a str, closers: &[(&str, NodeShape)]) -> Option<(String, NodeShape, &'a str)> {
    // A quoted label may contain bracket characters.
    let search_from = match body.trim_start().strip_prefix('"') {
        Some(quoted) => body.len() - quoted.len() + quoted.find('"')? + 1,
        None => 0,
    };
    let tail = &body[search_from..];
    let (pos, closer, shape) = closers
        .iter()
        .filter_map(|(closer, shape)| tail.find(closer).map(|pos| (pos, *closer, *shape)))
        .min_by_key(|(pos, _, _)| *pos)?;
    if search_from > 0 && !tail[..pos].trim().is_empty() {
        return None;
    }
    let label = clean_label(&body[..search_from + pos]);
    Some((label, shape, &tail[pos + closer.len()..]))
}

fn clean_label(raw: &str) -> String {
    let mut label = raw.trim();
    if label.len() >= 2 && label.starts_with('"') && label.ends_with('"') {
        label = &label[1..label.len() - 1];
    }
    if label.len() >= 2 && label.starts_with('`') && label.ends_with('`') {
        label = &label[1..label.len() - 1];
    }
    label.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn link_patterns() -> &'static (Regex, Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |p: &str| Regex::new(p).expect("link pattern is valid");
        (
            // -- text -->   == text ==>   -. text .->
            compile(r"^(<)?(--|==|-\.)\s+(.+?)\s*(-{2,}|={2,}|\.+-)([>ox])?"),
            // -->  ---  -.->  ==>  ~~~
            compile(r"^(<)?(-{2,}|={2,}|-\.+-|~{3,})([>ox])?"),
            // |text|
            compile(r"^\s*\|([^|]*)\|"),
        )
    })
}

fn parse_link(text: &str) -> Option<(Link, &str)> {
    let (with_text, plain, pipe) = link_patterns();

    let (tail, body, marker, mut label, end) = if let Some(caps) = with_text.captures(text) {
        let body = caps.get(2).map_or("", |m| m.as_str());
        (
            caps.get(1).is_some(),
            body.to_string(),
            caps.get(5).map(|m| m.as_str()),
            Some(clean_label(caps.get(3).map_or("", |m| m.as_str()))),
            caps.get(0).map_or(0, |m| m.end()),
        )
    } else {
        let caps = plain.captures(text)?;
        (
            caps.get(1).is_some(),
            caps.get(2).map_or("", |m| m.as_str()).to_string(),
            caps.get(3).map(|m| m.as_str()),
            None,
            caps.get(0).map_or(0, |m| m.end()),
        )
    };

    // `--- xray` is an open link to node `xray`, not a cross head.
    let mut end = end;
    let mut marker = marker;
    if matches!(marker, Some("o") | Some("x")) && id_length(&text[end..]) > 0 {
        marker = None;
        end -= 1;
    }

    let mut rest = &text[end..];
    if let Some(caps) = pipe.captures(rest) {
        label = Some(clean_label(caps.get(1).map_or("", |m| m.as_str())));
        rest = &rest[caps.get(0).map_or(0, |m| m.end())..];
    }

    let style = if body.starts_with('~') {
        EdgeStyle::Invisible
    } else if body.contains('=') {
        EdgeStyle::Thick
    } else if body.contains('.') {
        EdgeStyle::Dotted
    } else {
        EdgeStyle::Solid
    };
    let head = match marker {
        Some(">") => ArrowHead::Arrow,
        Some("o") => ArrowHead::Circle,
        Some("x") => ArrowHead::Cross,
        _ => ArrowHead::None,
    };
    let tail = if tail { ArrowHead::Arrow } else { ArrowHead::None };

    Some((Link { style, head, tail, label: label.filter(|l| !l.is_empty()) }, rest))
}
