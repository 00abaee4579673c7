use super::config::{DiagramConfig, Theme};
use super::layout::{line_height, Layout, Rect};
use super::parse::{ArrowHead, EdgeStyle, Flowchart, NodeShape, NodeStyle};
use std::fmt::Write;

/// Emit the SVG document. Every element id is prefixed with `id` so several diagrams can
/// live in one page without their markers colliding.
pub fn render_svg(chart: &Flowchart, layout: &Layout, id: &str, config: &DiagramConfig) -> String {
    let theme = config.theme.palette();
    let mut svg = String::new();
    let (w, h) = (layout.width, layout.height);

    let _ = write!(
        svg,
        "<svg id=\"{id}\" xmlns=\"http://www.w3.org/2000/svg\" width=\"{w:.2}\" height=\"{h:.2}\" viewBox=\"0 0 {w:.2} {h:.2}\" role=\"graphics-document document\" aria-roledescription=\"flowchart-v2\" style=\"max-width: {w:.2}px; background-color: {};\">",
        theme.background
    );
    let _ = write!(
        svg,
        "<style>#{id}{{font-family:\"{}\",sans-serif;font-size:{}px;fill:{};}}#{id} .edge-label text{{font-size:{}px;}}</style>",
        escape_xml(&config.font_family),
        config.font_size,
        theme.text_color,
        config.font_size * 0.85
    );
    push_markers(&mut svg, id, &theme);

    svg.push_str("<g class=\"clusters\">");
    for cluster in &layout.clusters {
        let sg = &chart.subgraphs[cluster.subgraph];
        let r = cluster.rect;
        let mut style = NodeStyle {
            stroke_width: Some("1.2".into()),
            stroke_dasharray: Some("6 4".into()),
            ..NodeStyle::default()
        };
        style.merge(&sg.style);
        let _ = write!(
            svg,
            "<g class=\"cluster\" id=\"{id}-cluster-{}\" data-id=\"{}\"><rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"6\" ry=\"6\" fill-opacity=\"0.55\" {}/>",
            cluster.subgraph,
            escape_xml(&sg.id),
            r.x, r.y, r.width, r.height,
            paint_attrs(&style, theme.cluster_fill, theme.cluster_border)
        );
        let _ = write!(
            svg,
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-weight=\"600\"{}>{}</text></g>",
            r.x + r.width / 2.0,
            r.y + 18.0,
            text_fill(&style),
            escape_xml(&sg.title)
        );
    }
    svg.push_str("</g>");

    svg.push_str("<g class=\"edge-paths\">");
    for path in &layout.edges {
        let edge = &chart.edges[path.edge];
        let (dash, width) = match edge.style {
            EdgeStyle::Solid => ("", 1.5),
            EdgeStyle::Dotted => (" stroke-dasharray=\"3 3\"", 1.5),
            EdgeStyle::Thick => ("", 3.5),
            EdgeStyle::Invisible => continue,
        };
        let mut d = String::new();
        for (i, (x, y)) in path.points.iter().enumerate() {
            let _ = write!(d, "{}{:.2},{:.2}", if i == 0 { "M" } else { " L" }, x, y);
        }
        let _ = write!(
            svg,
            "<path id=\"{id}-edge-{}\" d=\"{d}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{width}\"{dash}{}{}/>",
            path.edge,
            theme.line_color,
            marker_attr(id, "marker-end", edge.head, "end"),
            marker_attr(id, "marker-start", edge.tail, "start"),
        );
    }
    svg.push_str("</g>");

    svg.push_str("<g class=\"edge-labels\">");
    for path in &layout.edges {
        let edge = &chart.edges[path.edge];
        let (Some((x, y)), Some(label)) = (path.label_at, edge.label.as_deref()) else { continue };
        if edge.style == EdgeStyle::Invisible {
            continue;
        }
        let label_size = config.font_size * 0.85;
        let lw = super::layout::text_width(label, label_size) + 8.0;
        let lh = label_size * 1.4;
        let _ = write!(
            svg,
            "<g class=\"edge-label\"><rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"3\" fill=\"{}\"/><text x=\"{x:.2}\" y=\"{y:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\">{}</text></g>",
            x - lw / 2.0,
            y - lh / 2.0,
            lw,
            lh,
            theme.edge_label_background,
            escape_xml(label)
        );
    }
    svg.push_str("</g>");

    svg.push_str("<g class=\"nodes\">");
    for (i, (node, placed)) in chart.nodes.iter().zip(&layout.nodes).enumerate() {
        let classes: String = node.classes.iter().map(|c| format!(" {}", escape_xml(c))).collect();
        let _ = write!(
            svg,
            "<g class=\"node{classes}\" id=\"{id}-node-{i}\" data-id=\"{}\">",
            escape_xml(&node.id)
        );
        let mut style = NodeStyle { stroke_width: Some("1.5".into()), ..NodeStyle::default() };
        style.merge(&chart.resolved_style(i));
        let stroke = escape_xml(style.stroke.as_deref().unwrap_or(theme.node_border));
        svg.push_str(&shape_svg(node.shape, &placed.rect, &paint_attrs(&style, theme.node_fill, theme.node_border), &stroke));
        push_text(&mut svg, &placed.rect, &placed.lines, line_height(config), &text_fill(&style));
        svg.push_str("</g>");
    }
    svg.push_str("</g></svg>");
    svg
}

fn push_markers(svg: &mut String, id: &str, theme: &Theme) {
    let color = theme.line_color;
    svg.push_str("<defs>");
    for (suffix, orient) in [("end", "auto"), ("start", "auto-start-reverse")] {
        let _ = write!(
            svg,
            "<marker id=\"{id}-arrow-{suffix}\" viewBox=\"0 0 10 10\" refX=\"9\" refY=\"5\" markerWidth=\"8\" markerHeight=\"8\" orient=\"{orient}\"><path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"{color}\"/></marker>\
             <marker id=\"{id}-circle-{suffix}\" viewBox=\"0 0 10 10\" refX=\"9\" refY=\"5\" markerWidth=\"7\" markerHeight=\"7\" orient=\"{orient}\"><circle cx=\"5\" cy=\"5\" r=\"4\" fill=\"{color}\"/></marker>\
             <marker id=\"{id}-cross-{suffix}\" viewBox=\"0 0 10 10\" refX=\"8\" refY=\"5\" markerWidth=\"8\" markerHeight=\"8\" orient=\"{orient}\"><path d=\"M 1 1 L 9 9 M 1 9 L 9 1\" stroke=\"{color}\" stroke-width=\"2\"/></marker>"
        );
    }
    svg.push_str("</defs>");
}

fn marker_attr(id: &str, attr: &str, head: ArrowHead, suffix: &str) -> String {
    let kind = match head {
        ArrowHead::None => return String::new(),
        ArrowHead::Arrow => "arrow",
        ArrowHead::Circle => "circle",
        ArrowHead::Cross => "cross",
    };
    format!(" {attr}=\"url(#{id}-{kind}-{suffix})\"")
}

/// `fill`, `stroke` and width/dash attributes, falling back to the theme colors.
fn paint_attrs(style: &NodeStyle, fill: &str, stroke: &str) -> String {
    let mut attrs = format!(
        "fill=\"{}\" stroke=\"{}\"",
        escape_xml(style.fill.as_deref().unwrap_or(fill)),
        escape_xml(style.stroke.as_deref().unwrap_or(stroke))
    );
    if let Some(width) = &style.stroke_width {
        let _ = write!(attrs, " stroke-width=\"{}\"", escape_xml(width));
    }
    if let Some(dash) = &style.stroke_dasharray {
        let _ = write!(attrs, " stroke-dasharray=\"{}\"", escape_xml(dash));
    }
    attrs
}

fn text_fill(style: &NodeStyle) -> String {
    style.color.as_deref().map(|c| format!(" fill=\"{}\"", escape_xml(c))).unwrap_or_default()
}

fn polygon(points: &[(f32, f32)], paint: &str) -> String {
    let pts: Vec<String> = points.iter().map(|(x, y)| format!("{x:.2},{y:.2}")).collect();
    format!("<polygon points=\"{}\" {paint}/>", pts.join(" "))
}

/// `paint` carries the fill and stroke attributes; `stroke` is the bare stroke color for
/// decorations drawn on top of the outline.
fn shape_svg(shape: NodeShape, r: &Rect, paint: &str, stroke: &str) -> String {
    let (cx, cy) = r.center();
    let (left, top, right, bottom) = (r.x, r.y, r.right(), r.bottom());
    let rect = |rx: f32| {
        format!(
            "<rect x=\"{left:.2}\" y=\"{top:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"{rx:.2}\" ry=\"{rx:.2}\" {paint}/>",
            r.width, r.height
        )
    };
    let slant = r.height / 2.0;
    match shape {
        NodeShape::Rect => rect(0.0),
        NodeShape::Rounded => rect(8.0),
        NodeShape::Stadium => rect(r.height / 2.0),
        NodeShape::Subroutine => format!(
            "{}<line x1=\"{a:.2}\" y1=\"{top:.2}\" x2=\"{a:.2}\" y2=\"{bottom:.2}\" stroke=\"{stroke}\"/><line x1=\"{b:.2}\" y1=\"{top:.2}\" x2=\"{b:.2}\" y2=\"{bottom:.2}\" stroke=\"{stroke}\"/>",
            rect(0.0),
            a = left + 8.0,
            b = right - 8.0
        ),
        NodeShape::Cylinder => {
            let rx = r.width / 2.0;
            let ry = 7.0;
            let body = r.height - 2.0 * ry;
            format!(
                "<path d=\"M{left:.2},{:.2} a{rx:.2},{ry:.2} 0 0,0 {w:.2},0 a{rx:.2},{ry:.2} 0 0,0 {nw:.2},0 l0,{body:.2} a{rx:.2},{ry:.2} 0 0,0 {w:.2},0 l0,{nb:.2}\" {paint}/>",
                top + ry,
                w = r.width,
                nw = -r.width,
                nb = -body
            )
        }
        NodeShape::Circle => format!(
            "<circle cx=\"{cx:.2}\" cy=\"{cy:.2}\" r=\"{:.2}\" {paint}/>",
            r.width / 2.0
        ),
        NodeShape::DoubleCircle => format!(
            "<circle cx=\"{cx:.2}\" cy=\"{cy:.2}\" r=\"{:.2}\" {paint}/><circle cx=\"{cx:.2}\" cy=\"{cy:.2}\" r=\"{:.2}\" fill=\"none\" stroke=\"{stroke}\" stroke-width=\"1.5\"/>",
            r.width / 2.0,
            r.width / 2.0 - 5.0
        ),
        NodeShape::Diamond => polygon(&[(cx, top), (right, cy), (cx, bottom), (left, cy)], paint),
        NodeShape::Hexagon => {
            let m = r.height / 4.0;
            polygon(
                &[(left + m, top), (right - m, top), (right, cy), (right - m, bottom), (left + m, bottom), (left, cy)],
                paint,
            )
        }
        NodeShape::Parallelogram => polygon(&[(left + slant, top), (right, top), (right - slant, bottom), (left, bottom)], paint),
        NodeShape::ParallelogramAlt => polygon(&[(left, top), (right - slant, top), (right, bottom), (left + slant, bottom)], paint),
        NodeShape::Trapezoid => polygon(&[(left + slant, top), (right - slant, top), (right, bottom), (left, bottom)], paint),
        NodeShape::TrapezoidAlt => polygon(&[(left, top), (right, top), (right - slant, bottom), (left + slant, bottom)], paint),
        NodeShape::Asymmetric => polygon(&[(left, top), (right, top), (right, bottom), (left, bottom), (left + slant, cy)], paint),
    }
}

fn push_text(svg: &mut String, r: &Rect, lines: &[String], line_height: f32, fill: &str) {
    let (cx, cy) = r.center();
    let first = -((lines.len().max(1) - 1) as f32) * line_height / 2.0;
    let _ = write!(svg, "<text x=\"{cx:.2}\" y=\"{cy:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\"{fill}>");
    for (i, line) in lines.iter().enumerate() {
        let dy = if i == 0 { first } else { line_height };
        let _ = write!(svg, "<tspan x=\"{cx:.2}\" dy=\"{dy:.2}\">{}</tspan>", escape_xml(line));
    }
    svg.push_str("</text>");
}

pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
