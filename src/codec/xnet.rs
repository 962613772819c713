//! XNET text codec (spec §4.7.1, component C7).
//!
//! Line-oriented, banner-versioned. Grounded on the teacher's `dot.rs`: both
//! turn graph state into a small directive-driven text format. `dot.rs` only
//! writes; the read half instead follows the split-into-lines,
//! walk-directives style used by small text-format parsers across the pack.

use std::io::{BufRead, Write};

use crate::attr::category::categorize;
use crate::attr::{Attribute, AttrBuffer, BaseType, CategoryDict, Scope, SortPolicy};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;

pub const ORIGINAL_IDS_ATTR: &str = "_original_ids_";
const MISSING_LABEL: &str = "__NA__";

#[derive(Debug, Default, Clone)]
pub struct XnetWriteOptions {
    pub node_allow: Option<Vec<String>>,
    pub node_ignore: Option<Vec<String>>,
    pub edge_allow: Option<Vec<String>>,
    pub edge_ignore: Option<Vec<String>>,
}

fn included(name: &str, allow: &Option<Vec<String>>, ignore: &Option<Vec<String>>) -> bool {
    if let Some(allow) = allow {
        if !allow.iter().any(|a| a == name) {
            return false;
        }
    }
    if let Some(ignore) = ignore {
        if ignore.iter().any(|i| i == name) {
            return false;
        }
    }
    true
}

fn type_code(base_type: BaseType, dimension: u32) -> Option<String> {
    let base = match base_type {
        BaseType::String => "s",
        BaseType::F32 => "f",
        BaseType::I32 => "i",
        BaseType::U32 => "u",
        BaseType::I64 => "I",
        BaseType::U64 => "U",
        BaseType::Category => "c",
        BaseType::Bool
        | BaseType::F64
        | BaseType::MultiCategory
        | BaseType::OpaqueData
        | BaseType::HostShadow => return None,
    };
    if base_type == BaseType::String || dimension == 1 {
        Some(base.to_string())
    } else {
        Some(format!("{base}{dimension}"))
    }
}

fn parse_type_code(code: &str) -> GraphResult<(BaseType, u32)> {
    let (letter, rest) = code.split_at(1);
    let dim: u32 = if rest.is_empty() {
        1
    } else {
        rest.parse().map_err(|_| GraphError::corrupt(format!("bad type code '{code}'")))?
    };
    let base = match letter {
        "s" => BaseType::String,
        "f" => BaseType::F32,
        "i" => BaseType::I32,
        "u" => BaseType::U32,
        "I" => BaseType::I64,
        "U" => BaseType::U64,
        "c" => BaseType::Category,
        "n" => BaseType::F32, // legacy scalar
        "v" => BaseType::F32, // legacy vector, "v2"/"v3"
        other => return Err(GraphError::corrupt(format!("unknown type code '{other}'"))),
    };
    Ok((base, dim))
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for b in s.bytes() {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            0x00..=0x1F | 0x7F => out.push_str(&format!("\\x{b:02X}")),
            _ => out.push(b as char),
        }
    }
    out.push('"');
    out
}

fn unquote_string(tok: &str) -> GraphResult<String> {
    if !tok.starts_with('"') {
        return Ok(tok.to_string());
    }
    let inner = tok
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| GraphError::corrupt("unterminated quoted string"))?;
    let mut out = String::new();
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b'n' => {
                    out.push('\n');
                    i += 2;
                }
                b't' => {
                    out.push('\t');
                    i += 2;
                }
                b'r' => {
                    out.push('\r');
                    i += 2;
                }
                b'\\' => {
                    out.push('\\');
                    i += 2;
                }
                b'"' => {
                    out.push('"');
                    i += 2;
                }
                b'x' if i + 3 < bytes.len() => {
                    let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).unwrap_or("");
                    let byte = u8::from_str_radix(hex, 16).unwrap_or(0);
                    out.push(byte as char);
                    i += 4;
                }
                _ => {
                    out.push(bytes[i] as char);
                    i += 1;
                }
            }
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    Ok(out)
}

/// Writes `graph` to `w` in XNET text form (spec §4.7.1 "Writer guarantees").
pub fn write_xnet<W: Write>(graph: &Graph, w: &mut W, opts: &XnetWriteOptions) -> GraphResult<()> {
    writeln!(w, "#XNET 1.0.0")?;

    let compacted = graph.compact(Some(ORIGINAL_IDS_ATTR), None)?;

    writeln!(w, "#vertices {}", compacted.node_count())?;

    for name in compacted.attribute_names(Scope::Graph) {
        write_attr_block(&compacted, w, Scope::Graph, &name)?;
    }

    writeln!(w, "#edges {}", if compacted.directed { "directed" } else { "undirected" })?;
    for e in 0..compacted.edge_capacity() {
        if compacted.edge_active(e) {
            let (u, v) = compacted.edge_endpoints(e)?;
            writeln!(w, "{u} {v}")?;
        }
    }

    for name in compacted.attribute_names(Scope::Node) {
        if !included(&name, &opts.node_allow, &opts.node_ignore) {
            continue;
        }
        write_attr_block(&compacted, w, Scope::Node, &name)?;
    }

    for name in compacted.attribute_names(Scope::Edge) {
        if !included(&name, &opts.edge_allow, &opts.edge_ignore) {
            continue;
        }
        write_attr_block(&compacted, w, Scope::Edge, &name)?;
    }

    Ok(())
}

fn write_attr_block<W: Write>(graph: &Graph, w: &mut W, scope: Scope, name: &str) -> GraphResult<()> {
    let attr = graph.get_attribute(scope, name)?;
    let Some(code) = type_code(attr.base_type, attr.dimension) else {
        return Ok(()); // unsupported types are skipped (spec §4.7.1)
    };
    let tag = match scope {
        Scope::Node => "v",
        Scope::Edge => "e",
        Scope::Graph => "g",
    };

    if let AttrBuffer::Category { dict, .. } = &attr.buffer {
        let dict_tag = match scope {
            Scope::Node => "vdict",
            Scope::Edge => "edict",
            Scope::Graph => "gdict",
        };
        writeln!(w, "#{dict_tag} {} {}", quote_string(name), dict.len())?;
        for (id, label) in dict.labels_by_id().iter().enumerate() {
            writeln!(w, "{id} {}", quote_string(label))?;
        }
    }

    writeln!(w, "#{tag} {} {}", quote_string(name), code)?;
    write_attr_values(attr, w)
}

fn write_attr_values<W: Write>(attr: &Attribute, w: &mut W) -> GraphResult<()> {
    let capacity = attr.capacity;
    match &attr.buffer {
        AttrBuffer::String(v) => {
            let dim = attr.dimension as usize;
            for slot in 0..capacity as usize {
                let parts: Vec<String> = (0..dim)
                    .map(|d| match &v[slot * dim + d] {
                        Some(s) => quote_string(s),
                        None => "\"\"".to_string(),
                    })
                    .collect();
                writeln!(w, "{}", parts.join(" "))?;
            }
        }
        AttrBuffer::Category { codes, .. } => {
            for &c in codes.iter() {
                writeln!(w, "{c}")?;
            }
        }
        _ => {
            let dim = attr.dimension;
            for slot in 0..capacity {
                let parts: Vec<String> = (0..dim)
                    .map(|c| attr.buffer.as_f64_scalar(slot, dim, c).map(|v| format!("{v}")))
                    .collect::<GraphResult<_>>()?;
                writeln!(w, "{}", parts.join(" "))?;
            }
        }
    }
    Ok(())
}

struct Lines {
    lines: Vec<String>,
    pos: usize,
}

impl Lines {
    fn next_content(&mut self) -> Option<String> {
        while self.pos < self.lines.len() {
            let l = self.lines[self.pos].clone();
            self.pos += 1;
            if l.is_empty() || l.starts_with("##") {
                continue;
            }
            return Some(l);
        }
        None
    }

    fn peek_content(&mut self) -> Option<String> {
        let save = self.pos;
        let r = self.next_content();
        self.pos = save;
        r
    }
}

fn tokenize_header(line: &str) -> Vec<String> {
    let mut toks = Vec::new();
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        if bytes[i] == b'"' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(bytes.len());
            toks.push(line[start..i].to_string());
        } else {
            let start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            toks.push(line[start..i].to_string());
        }
    }
    toks
}

/// Reads a graph from XNET text form (spec §4.7.1).
pub fn read_xnet<R: BufRead>(r: &mut R) -> GraphResult<Graph> {
    let raw_lines: Vec<String> = r.lines().collect::<std::io::Result<_>>()?;
    let lines: Vec<String> = raw_lines.into_iter().map(|l| l.trim_end().to_string()).collect();
    let mut cur = Lines { lines, pos: 0 };

    let first = cur.peek_content().ok_or_else(|| GraphError::corrupt("empty XNET file"))?;
    let legacy = !first.starts_with("#XNET");
    if !legacy {
        cur.next_content();
    } else {
        tracing::warn!("XNET legacy mode detected (no #XNET banner)");
    }

    let vertices_line = cur.next_content().ok_or_else(|| GraphError::corrupt("missing #vertices"))?;
    let vtoks = tokenize_header(&vertices_line);
    if vtoks.first().map(String::as_str) != Some("#vertices") {
        return Err(GraphError::corrupt("expected #vertices directive"));
    }
    let n_vertices: u32 = vtoks
        .get(1)
        .ok_or_else(|| GraphError::corrupt("#vertices missing count"))?
        .parse()
        .map_err(|_| GraphError::corrupt("invalid #vertices count"))?;

    let mut legacy_labels = Vec::new();
    if legacy {
        for _ in 0..n_vertices {
            if let Some(l) = cur.peek_content() {
                if !l.starts_with('#') {
                    cur.next_content();
                    legacy_labels.push(unquote_string(l.trim())?);
                    continue;
                }
            }
            break;
        }
    }

    let mut graph_attrs: Vec<(String, BaseType, u32)> = Vec::new();
    let mut graph_values: Vec<String> = Vec::new();
    let mut pending_dict: Option<(String, CategoryDict)> = None;

    loop {
        let Some(peeked) = cur.peek_content() else { break };
        if peeked.starts_with("#edges") {
            break;
        }
        let line = cur.next_content().unwrap();
        let toks = tokenize_header(&line);
        match toks.first().map(String::as_str) {
            Some("#gdict") => {
                let name = unquote_string(&toks[1])?;
                let k: usize = toks[2].parse().map_err(|_| GraphError::corrupt("bad dict count"))?;
                let mut labels = vec![String::new(); k];
                for _ in 0..k {
                    let entry = cur.next_content().ok_or_else(|| GraphError::corrupt("truncated dict"))?;
                    let t = tokenize_header(&entry);
                    let id: usize = t[0].parse().map_err(|_| GraphError::corrupt("bad dict id"))?;
                    labels[id] = unquote_string(&t[1])?;
                }
                let mut dict = CategoryDict::new();
                dict.set_labels(labels);
                pending_dict = Some((name, dict));
            }
            Some("#g") => {
                let name = unquote_string(&toks[1])?;
                let (base, dim) = parse_type_code(&toks[2])?;
                graph_attrs.push((name, base, dim));
                let value_line = cur.next_content().ok_or_else(|| GraphError::corrupt("missing graph attribute value"))?;
                graph_values.push(value_line);
            }
            _ => return Err(GraphError::corrupt(format!("unexpected directive before #edges: {line}"))),
        }
    }

    let edges_line = cur.next_content().ok_or_else(|| GraphError::corrupt("missing #edges"))?;
    let etoks = tokenize_header(&edges_line);
    let mut directed = true;
    for t in &etoks[1..] {
        match t.as_str() {
            "directed" => directed = true,
            "undirected" => directed = false,
            _ => {}
        }
    }

    let mut pairs = Vec::new();
    loop {
        let Some(peeked) = cur.peek_content() else { break };
        if peeked.starts_with('#') {
            break;
        }
        let line = cur.next_content().unwrap();
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            break;
        }
        let u: u32 = parts[0].parse().map_err(|_| GraphError::corrupt("bad edge endpoint"))?;
        let v: u32 = parts[1].parse().map_err(|_| GraphError::corrupt("bad edge endpoint"))?;
        pairs.push((u, v));
    }

    let mut graph = Graph::new(directed, n_vertices, pairs.len() as u32);
    if n_vertices > 0 {
        graph.add_nodes(n_vertices)?;
    }
    if !pairs.is_empty() {
        graph.add_edges(&pairs)?;
    }

    for (i, (name, base, dim)) in graph_attrs.into_iter().enumerate() {
        graph.define_attribute(Scope::Graph, &name, base, dim)?;
        let dict = pending_dict.as_ref().filter(|(n, _)| n == &name).map(|(_, d)| d.clone());
        apply_value_line(&mut graph, Scope::Graph, &name, base, dim, 0, &graph_values[i], dict.as_ref())?;
    }

    read_scoped_attributes(&mut cur, &mut graph, Scope::Node, n_vertices)?;
    if !legacy_labels.is_empty() {
        graph.define_attribute(Scope::Node, "label", BaseType::String, 1)?;
        for (i, label) in legacy_labels.into_iter().enumerate() {
            graph.set_value_string(Scope::Node, "label", i as u32, Some(&label))?;
        }
    }
    read_scoped_attributes(&mut cur, &mut graph, Scope::Edge, pairs.len() as u32)?;

    Ok(graph)
}

fn read_scoped_attributes(cur: &mut Lines, graph: &mut Graph, scope: Scope, capacity: u32) -> GraphResult<()> {
    let (attr_tag, dict_tag) = match scope {
        Scope::Node => ("#v", "#vdict"),
        Scope::Edge => ("#e", "#edict"),
        Scope::Graph => ("#g", "#gdict"),
    };
    let mut pending_dict: Option<CategoryDict> = None;
    loop {
        let Some(peeked) = cur.peek_content() else { break };
        if !peeked.starts_with(attr_tag) {
            break;
        }
        let line = cur.next_content().unwrap();
        let toks = tokenize_header(&line);
        if toks[0] == dict_tag {
            let k: usize = toks[2].parse().map_err(|_| GraphError::corrupt("bad dict count"))?;
            let mut labels = vec![String::new(); k];
            for _ in 0..k {
                let entry = cur.next_content().ok_or_else(|| GraphError::corrupt("truncated dict"))?;
                let t = tokenize_header(&entry);
                let id: usize = t[0].parse().map_err(|_| GraphError::corrupt("bad dict id"))?;
                labels[id] = unquote_string(&t[1])?;
            }
            let mut dict = CategoryDict::new();
            dict.set_labels(labels);
            pending_dict = Some(dict);
            continue;
        }
        if toks[0] != attr_tag {
            break;
        }
        let name = unquote_string(&toks[1])?;
        let (base, dim) = parse_type_code(&toks[2])?;
        let auto_category = base == BaseType::String && name.ends_with("__category");
        let effective_base = if auto_category { BaseType::Category } else { base };
        graph.define_attribute(scope, &name, effective_base, if auto_category { 1 } else { dim })?;

        let mut raw_lines = Vec::with_capacity(capacity as usize);
        for _ in 0..capacity {
            raw_lines.push(cur.next_content().ok_or_else(|| GraphError::corrupt("truncated attribute block"))?);
        }

        if auto_category {
            let unquoted: Vec<String> = raw_lines.iter().map(|l| unquote_string(l.trim())).collect::<GraphResult<_>>()?;
            let string_values: Vec<Option<&str>> = unquoted
                .iter()
                .map(|s| if s == MISSING_LABEL { None } else { Some(s.as_str()) })
                .collect();
            let (codes, dict) = categorize(&string_values, SortPolicy::Frequency);
            if let AttrBuffer::Category { codes: c, dict: d } = &mut graph.get_attribute_mut(scope, &name)?.buffer {
                *c = codes;
                *d = dict;
            }
            continue;
        }

        for (slot, raw) in raw_lines.into_iter().enumerate() {
            apply_value_line(graph, scope, &name, base, dim, slot as u32, &raw, pending_dict.as_ref())?;
        }
        pending_dict = None;
    }
    Ok(())
}

fn apply_value_line(
    graph: &mut Graph,
    scope: Scope,
    name: &str,
    base: BaseType,
    dim: u32,
    slot: u32,
    raw: &str,
    dict: Option<&CategoryDict>,
) -> GraphResult<()> {
    match base {
        BaseType::String => {
            let toks = tokenize_header(raw);
            let v = toks.first().map(|t| unquote_string(t)).transpose()?;
            graph.set_value_string(scope, name, slot, v.as_deref().filter(|s| !s.is_empty()))?;
        }
        BaseType::Category => {
            let code: i32 = raw.trim().parse().map_err(|_| GraphError::corrupt("bad category code"))?;
            if let AttrBuffer::Category { codes, dict: d } = &mut graph.get_attribute_mut(scope, name)?.buffer {
                codes[slot as usize] = code;
                if let Some(dict) = dict {
                    *d = dict.clone();
                }
            }
        }
        _ => {
            let parts: Vec<&str> = raw.split_whitespace().collect();
            for (c, p) in parts.iter().enumerate().take(dim as usize) {
                let v: f64 = p.parse().map_err(|_| GraphError::corrupt(format!("bad numeric value '{p}'")))?;
                graph.set_value_f64(scope, name, slot, c as u32, v)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_scalar_attribute() {
        let mut g = Graph::new(true, 0, 0);
        g.add_nodes(2).unwrap();
        g.add_edges(&[(0, 1)]).unwrap();
        g.define_attribute(Scope::Node, "weight", BaseType::F32, 1).unwrap();
        g.set_value_f64(Scope::Node, "weight", 0, 0, 1.5).unwrap();
        g.set_value_f64(Scope::Node, "weight", 1, 0, 2.5).unwrap();

        let mut buf = Vec::new();
        write_xnet(&g, &mut buf, &XnetWriteOptions::default()).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let back = read_xnet(&mut cursor).unwrap();

        assert_eq!(back.node_count(), 2);
        assert_eq!(back.edge_count(), 1);
        assert_eq!(back.get_value_f64(Scope::Node, "weight", 0, 0).unwrap(), 1.5);
        assert_eq!(back.get_value_f64(Scope::Node, "weight", 1, 0).unwrap(), 2.5);
    }

    #[test]
    fn writer_emits_original_ids_attribute() {
        let mut g = Graph::new(true, 0, 0);
        g.add_nodes(3).unwrap();
        g.remove_nodes(&[1]).unwrap();
        let mut buf = Vec::new();
        write_xnet(&g, &mut buf, &XnetWriteOptions::default()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(ORIGINAL_IDS_ATTR));
    }

    #[test]
    fn category_attribute_round_trips_through_text() {
        let mut g = Graph::new(true, 0, 0);
        g.add_nodes(3).unwrap();
        g.define_attribute(Scope::Node, "kind", BaseType::Category, 1).unwrap();
        let string_values: Vec<Option<&str>> = vec![Some("a"), Some("b"), Some("a")];
        let (codes, dict) = categorize(&string_values, SortPolicy::Frequency);
        if let AttrBuffer::Category { codes: c, dict: d } = &mut g.get_attribute_mut(Scope::Node, "kind").unwrap().buffer {
            *c = codes;
            *d = dict;
        }

        let mut buf = Vec::new();
        write_xnet(&g, &mut buf, &XnetWriteOptions::default()).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let back = read_xnet(&mut cursor).unwrap();
        assert_eq!(back.get_value_f64(Scope::Node, "kind", 0, 0).unwrap(), 0.0);
        assert_eq!(back.get_value_f64(Scope::Node, "kind", 1, 0).unwrap(), 1.0);
        assert_eq!(back.get_value_f64(Scope::Node, "kind", 2, 0).unwrap(), 0.0);
    }
}
