//! Evaluator for the selector query language (spec §4.6 "Evaluation").

use regex::Regex;

use super::ast::{Accessor, Expr, Literal, Operator, Predicate, Qualifier};
use crate::attr::{AttrBuffer, BaseType, Scope};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Node,
    Edge,
}

/// Runs `query` over every active index of `target` and returns the
/// matching indices, in ascending index order (an append-only selector per
/// spec §4.6). On any parse or bind error, returns that error; callers
/// leave the selector empty per spec §4.6 "Errors".
pub fn select(graph: &Graph, target: Target, query: &str) -> GraphResult<Vec<u32>> {
    let expr = super::parser::parse(query)?;
    validate_qualifiers(&expr, target)?;

    let capacity = match target {
        Target::Node => graph.node_capacity(),
        Target::Edge => graph.edge_capacity(),
    };
    let mut out = Vec::new();
    for i in 0..capacity {
        let active = match target {
            Target::Node => graph.node_active(i),
            Target::Edge => graph.edge_active(i),
        };
        if !active {
            continue;
        }
        if eval_expr(graph, target, i, &expr)? {
            out.push(i);
        }
    }
    Ok(out)
}

fn validate_qualifiers(expr: &Expr, target: Target) -> GraphResult<()> {
    match expr {
        Expr::Predicate(p) => {
            let ok = match (target, &p.qualref.qualifier) {
                (Target::Node, Qualifier::SelfRef | Qualifier::AnyNeighbor | Qualifier::BothNeighbor) => true,
                (Target::Edge, Qualifier::SelfRef | Qualifier::Src | Qualifier::Dst | Qualifier::Any | Qualifier::Both) => true,
                _ => false,
            };
            if !ok {
                return Err(GraphError::query(0, "qualifier not valid for this selection scope"));
            }
            Ok(())
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            validate_qualifiers(a, target)?;
            validate_qualifiers(b, target)
        }
        Expr::Not(a) => validate_qualifiers(a, target),
    }
}

fn eval_expr(graph: &Graph, target: Target, idx: u32, expr: &Expr) -> GraphResult<bool> {
    Ok(match expr {
        Expr::Predicate(p) => eval_predicate(graph, target, idx, p)?,
        Expr::And(a, b) => eval_expr(graph, target, idx, a)? && eval_expr(graph, target, idx, b)?,
        Expr::Or(a, b) => eval_expr(graph, target, idx, a)? || eval_expr(graph, target, idx, b)?,
        Expr::Not(a) => !eval_expr(graph, target, idx, a)?,
    })
}

fn eval_predicate(graph: &Graph, target: Target, idx: u32, p: &Predicate) -> GraphResult<bool> {
    match (target, &p.qualref.qualifier) {
        (Target::Node, Qualifier::SelfRef) => eval_on_node(graph, idx, p),
        (Target::Node, Qualifier::AnyNeighbor) => {
            let neighbors = all_neighbors(graph, idx)?;
            for n in neighbors {
                if eval_on_node(graph, n, p)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        (Target::Node, Qualifier::BothNeighbor) => {
            let neighbors = all_neighbors(graph, idx)?;
            if neighbors.is_empty() {
                return Ok(false); // no vacuous truth, spec §9 (a)
            }
            for n in neighbors {
                if !eval_on_node(graph, n, p)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Target::Edge, Qualifier::SelfRef) => eval_on_edge(graph, idx, p),
        (Target::Edge, Qualifier::Src) => {
            let (u, _v) = graph.edge_endpoints(idx)?;
            eval_on_node(graph, u, p)
        }
        (Target::Edge, Qualifier::Dst) => {
            let (_u, v) = graph.edge_endpoints(idx)?;
            eval_on_node(graph, v, p)
        }
        (Target::Edge, Qualifier::Any) => {
            let (u, v) = graph.edge_endpoints(idx)?;
            Ok(eval_on_node(graph, u, p)? || eval_on_node(graph, v, p)?)
        }
        (Target::Edge, Qualifier::Both) => {
            let (u, v) = graph.edge_endpoints(idx)?;
            Ok(eval_on_node(graph, u, p)? && eval_on_node(graph, v, p)?)
        }
        _ => Err(GraphError::query(0, "qualifier not valid for this selection scope")),
    }
}

fn all_neighbors(graph: &Graph, node: u32) -> GraphResult<Vec<u32>> {
    let mut v = graph.out_neighbors(node)?.into_iter().map(|(n, _)| n).collect::<Vec<_>>();
    v.extend(graph.in_neighbors(node)?.into_iter().map(|(n, _)| n));
    Ok(v)
}

fn eval_on_node(graph: &Graph, node: u32, p: &Predicate) -> GraphResult<bool> {
    eval_on_scope(graph, Scope::Node, node, p)
}

fn eval_on_edge(graph: &Graph, edge: u32, p: &Predicate) -> GraphResult<bool> {
    eval_on_scope(graph, Scope::Edge, edge, p)
}

fn eval_on_scope(graph: &Graph, scope: Scope, slot: u32, p: &Predicate) -> GraphResult<bool> {
    let attr = graph
        .get_attribute(scope, &p.qualref.name)
        .map_err(|e| GraphError::query(0, e.to_string()))?;
    match attr.base_type {
        BaseType::String => eval_string(graph, scope, &p.qualref.name, slot, p),
        BaseType::Category => eval_category(graph, scope, &p.qualref.name, slot, p),
        BaseType::Bool
        | BaseType::F32
        | BaseType::F64
        | BaseType::I32
        | BaseType::U32
        | BaseType::I64
        | BaseType::U64 => eval_numeric(graph, scope, &p.qualref.name, slot, p),
        BaseType::MultiCategory | BaseType::OpaqueData | BaseType::HostShadow => {
            Err(GraphError::wrong_type(format!(
                "attribute '{}' cannot be queried",
                p.qualref.name
            )))
        }
    }
}

fn numeric_components(graph: &Graph, scope: Scope, name: &str, slot: u32) -> GraphResult<Vec<f64>> {
    let attr = graph.get_attribute(scope, name).map_err(|e| GraphError::query(0, e.to_string()))?;
    let dim = attr.dimension;
    (0..dim).map(|c| attr.buffer.as_f64_scalar(slot, dim, c)).collect()
}

fn reduce(components: &[f64], accessor: Option<&Accessor>, other: Option<&[f64]>) -> GraphResult<f64> {
    match accessor {
        None => {
            if components.len() != 1 {
                return Err(GraphError::wrong_type("vector attribute requires an accessor"));
            }
            Ok(components[0])
        }
        Some(Accessor::Component(i)) => components
            .get(*i)
            .copied()
            .ok_or_else(|| GraphError::out_of_range("vector component", *i as u64, components.len() as u64)),
        Some(Accessor::Min) => Ok(components.iter().copied().fold(f64::INFINITY, f64::min)),
        Some(Accessor::Max) => Ok(components.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        Some(Accessor::Avg) => Ok(components.iter().sum::<f64>() / components.len() as f64),
        Some(Accessor::Median) => {
            let mut v = components.to_vec();
            v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mid = v.len() / 2;
            if v.len() % 2 == 0 {
                Ok((v[mid - 1] + v[mid]) / 2.0)
            } else {
                Ok(v[mid])
            }
        }
        Some(Accessor::Std) => {
            let mean = components.iter().sum::<f64>() / components.len() as f64;
            let var = components.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / components.len() as f64;
            Ok(var.sqrt())
        }
        Some(Accessor::Abs) => Ok(components.iter().map(|x| x * x).sum::<f64>().sqrt()),
        Some(Accessor::DotAttr(_)) | Some(Accessor::DotLiteral(_)) => {
            let other = other.ok_or_else(|| GraphError::wrong_type("dot accessor missing operand"))?;
            if other.len() != components.len() {
                return Err(GraphError::invalid_argument("dot() dimension mismatch"));
            }
            Ok(components.iter().zip(other).map(|(a, b)| a * b).sum())
        }
        Some(Accessor::Any) | Some(Accessor::All) => {
            Err(GraphError::wrong_type(".any/.all must be paired directly with the comparison"))
        }
    }
}

fn eval_numeric(graph: &Graph, scope: Scope, name: &str, slot: u32, p: &Predicate) -> GraphResult<bool> {
    let components = numeric_components(graph, scope, name, slot)?;

    if matches!(p.accessor, Some(Accessor::Any) | Some(Accessor::All)) {
        let all = matches!(p.accessor, Some(Accessor::All));
        let mut any_true = false;
        let mut all_true = true;
        for &c in &components {
            let t = compare_numeric(c, &p.operator, &p.literal)?;
            any_true |= t;
            all_true &= t;
        }
        return Ok(if all { all_true } else { any_true });
    }

    let other = match &p.accessor {
        Some(Accessor::DotAttr(other_name)) => Some(numeric_components(graph, scope, other_name, slot)?),
        Some(Accessor::DotLiteral(nums)) => Some(nums.clone()),
        _ => None,
    };
    let value = reduce(&components, p.accessor.as_ref(), other.as_deref())?;
    compare_numeric(value, &p.operator, &p.literal)
}

fn literal_as_number(lit: &Literal) -> GraphResult<f64> {
    match lit {
        Literal::Number(n) => Ok(*n),
        _ => Err(GraphError::wrong_type("expected a numeric literal")),
    }
}

fn compare_numeric(value: f64, op: &Operator, lit: &Literal) -> GraphResult<bool> {
    match op {
        Operator::Eq => Ok(value == literal_as_number(lit)?),
        Operator::Ne => Ok(value != literal_as_number(lit)?),
        Operator::Lt => Ok(value < literal_as_number(lit)?),
        Operator::Le => Ok(value <= literal_as_number(lit)?),
        Operator::Gt => Ok(value > literal_as_number(lit)?),
        Operator::Ge => Ok(value >= literal_as_number(lit)?),
        Operator::In => match lit {
            Literal::List(items) => {
                for item in items {
                    if value == literal_as_number(item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(GraphError::invalid_argument("IN requires a list literal")),
        },
        Operator::Match => Err(GraphError::wrong_type("=~ only applies to string attributes")),
    }
}

fn eval_string(graph: &Graph, scope: Scope, name: &str, slot: u32, p: &Predicate) -> GraphResult<bool> {
    let value = graph.get_value_string(scope, name, slot)?;
    match &p.operator {
        Operator::Eq => Ok(value.as_deref() == literal_as_str(&p.literal)?),
        Operator::Ne => Ok(value.as_deref() != literal_as_str(&p.literal)?),
        Operator::Match => {
            let pattern = match &p.literal {
                Literal::Str(s) => s,
                _ => return Err(GraphError::invalid_argument("=~ requires a string literal")),
            };
            let re = Regex::new(pattern).map_err(|e| GraphError::invalid_argument(e.to_string()))?;
            Ok(value.as_deref().is_some_and(|v| re.is_match(v)))
        }
        Operator::In => match &p.literal {
            Literal::List(items) => {
                let Some(v) = value.as_deref() else { return Ok(false) };
                for item in items {
                    if let Literal::Str(s) = item {
                        if s == v {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            _ => Err(GraphError::invalid_argument("IN requires a list literal")),
        },
        _ => Err(GraphError::wrong_type("operator not applicable to string attributes")),
    }
}

fn literal_as_str(lit: &Literal) -> GraphResult<Option<&str>> {
    match lit {
        Literal::Str(s) => Ok(Some(s.as_str())),
        _ => Err(GraphError::wrong_type("expected a string literal")),
    }
}

fn eval_category(graph: &Graph, scope: Scope, name: &str, slot: u32, p: &Predicate) -> GraphResult<bool> {
    let attr = graph.get_attribute(scope, name).map_err(|e| GraphError::query(0, e.to_string()))?;
    let AttrBuffer::Category { codes, dict } = &attr.buffer else {
        unreachable!("base_type checked by caller");
    };
    let code = codes[slot as usize];

    match &p.operator {
        Operator::Eq | Operator::Ne => {
            let target_code = match &p.literal {
                Literal::Str(s) => dict.id_of(s).unwrap_or(crate::attr::MISSING_ID),
                Literal::Number(n) => *n as i32,
                Literal::List(_) => return Err(GraphError::wrong_type("== does not accept a list literal")),
            };
            let eq = code == target_code;
            Ok(if p.operator == Operator::Eq { eq } else { !eq })
        }
        Operator::In => match &p.literal {
            Literal::List(items) => {
                for item in items {
                    let target = match item {
                        Literal::Str(s) => dict.id_of(s).unwrap_or(crate::attr::MISSING_ID),
                        Literal::Number(n) => *n as i32,
                        Literal::List(_) => continue,
                    };
                    if code == target {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(GraphError::invalid_argument("IN requires a list literal")),
        },
        Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            compare_numeric(code as f64, &p.operator, &p.literal)
        }
        Operator::Match => Err(GraphError::wrong_type("=~ does not apply to categorical attributes")),
    }
}
