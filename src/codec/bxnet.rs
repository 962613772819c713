//! BXNet/ZXNet binary codec (spec §4.7.2, component C8).
//!
//! A fixed-size 64-byte header, a sequence of chunks, a fixed-size footer
//! carrying chunk locators and a CRC32 of the chunk stream. `.zxnet` wraps
//! the chunk stream in one [`bgzf`] member; `.bxnet` leaves it raw. Grounded
//! the same way as `xnet.rs`: the teacher has no binary serializer of its
//! own, so the frame shape (magic, fixed record order, length-prefixed
//! blocks, trailing CRC) follows the layout of the reference
//! `CXNetworkBXNet.c` implementation this format was distilled from, built
//! with the flate2/crc32fast crates the pack carries for exactly this job.

use std::io::{Read, Write};

use crc32fast::Hasher as Crc32;

use super::bgzf;
use crate::attr::{Attribute, AttrBuffer, BaseType, Scope};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;

const HEADER_MAGIC: &[u8; 8] = b"ZXNETFMT";
const FOOTER_MAGIC: &[u8; 8] = b"ZXFOOTER";
const HEADER_LEN: usize = 64;
const LOCATOR_LEN: usize = 24;
const MAX_LOCATORS: usize = 30;
// magic(8) + chunk_count(4) + reserved(4) + 30*locator(24) + count-block(40) + crc(4) + reserved(4)
const FOOTER_LEN: usize = 8 + 4 + 4 + MAX_LOCATORS * LOCATOR_LEN + 40 + 4 + 4;

const VERSION_MAJOR: u16 = 1;
const VERSION_MINOR: u16 = 0;
const VERSION_PATCH: u32 = 0;

const CODEC_NONE: u32 = 0;
const CODEC_GZIP: u32 = 1;

const FLAG_DIRECTED: u32 = 1 << 0;

const CHUNK_META: u32 = 0;
const CHUNK_NODE: u32 = 1;
const CHUNK_EDGE: u32 = 2;
const CHUNK_NODE_ATTR: u32 = 3;
const CHUNK_EDGE_ATTR: u32 = 4;
const CHUNK_NET_ATTR: u32 = 5;
const CHUNK_NODE_VALUES: u32 = 6;
const CHUNK_EDGE_VALUES: u32 = 7;
const CHUNK_NET_VALUES: u32 = 8;
const CHUNK_ORDER: [u32; 9] = [
    CHUNK_META,
    CHUNK_NODE,
    CHUNK_EDGE,
    CHUNK_NODE_ATTR,
    CHUNK_EDGE_ATTR,
    CHUNK_NET_ATTR,
    CHUNK_NODE_VALUES,
    CHUNK_EDGE_VALUES,
    CHUNK_NET_VALUES,
];

fn base_type_code(b: BaseType) -> u8 {
    match b {
        BaseType::String => 0,
        BaseType::Bool => 1,
        BaseType::F32 => 2,
        BaseType::F64 => 3,
        BaseType::I32 => 4,
        BaseType::U32 => 5,
        BaseType::I64 => 6,
        BaseType::U64 => 7,
        BaseType::Category => 8,
        BaseType::MultiCategory => 9,
        BaseType::OpaqueData => 10,
        BaseType::HostShadow => 11,
    }
}

fn base_type_from_code(c: u8) -> GraphResult<BaseType> {
    Ok(match c {
        0 => BaseType::String,
        1 => BaseType::Bool,
        2 => BaseType::F32,
        3 => BaseType::F64,
        4 => BaseType::I32,
        5 => BaseType::U32,
        6 => BaseType::I64,
        7 => BaseType::U64,
        8 => BaseType::Category,
        9 => BaseType::MultiCategory,
        10 => BaseType::OpaqueData,
        11 => BaseType::HostShadow,
        other => return Err(GraphError::corrupt(format!("unknown base type code {other}"))),
    })
}

/// Storage width in bytes for a fixed-width element, 0 for variable-width
/// payloads (String, MultiCategory) per the reference implementation's
/// `CXExpectedStorageWidthForType`.
fn storage_width(base_type: BaseType) -> u32 {
    base_type.element_size().map(|n| n as u32).unwrap_or(0)
}

/// Every block in a chunk payload is length-prefixed with a `u64` length,
/// per spec §4.7.2 "Payload is a sequence of length-prefixed blocks".
fn write_block(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> GraphResult<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(GraphError::corrupt("unexpected end of chunk stream"));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> GraphResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> GraphResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> GraphResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> GraphResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn block(&mut self) -> GraphResult<&'a [u8]> {
        let len = self.u64()? as usize;
        self.take(len)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

fn bits_to_bytes(capacity: u32, active: impl Fn(u32) -> bool) -> Vec<u8> {
    let mut bytes = vec![0u8; capacity.div_ceil(8) as usize];
    for i in 0..capacity {
        if active(i) {
            bytes[(i / 8) as usize] |= 1 << (i % 8);
        }
    }
    bytes
}

fn bytes_to_bits(bytes: &[u8], capacity: u32) -> Vec<bool> {
    (0..capacity).map(|i| (bytes[(i / 8) as usize] >> (i % 8)) & 1 != 0).collect()
}

/// 24-byte attribute descriptor per spec §4.7.2:
/// `(type:u8, reserved:u8, flags:u16, dimension:u32, storage_width:u32, reserved:u32, capacity:u64)`.
fn encode_attr_descriptor(attr: &Attribute) -> [u8; 24] {
    let mut out = [0u8; 24];
    out[0] = base_type_code(attr.base_type);
    out[1] = 0;
    out[2..4].copy_from_slice(&0u16.to_le_bytes());
    out[4..8].copy_from_slice(&attr.dimension.to_le_bytes());
    out[8..12].copy_from_slice(&storage_width(attr.base_type).to_le_bytes());
    out[12..16].copy_from_slice(&0u32.to_le_bytes());
    out[16..24].copy_from_slice(&(attr.capacity as u64).to_le_bytes());
    out
}

struct AttrDescriptor {
    name: String,
    base_type: BaseType,
    dimension: u32,
    capacity: u32,
}

fn decode_attr_descriptor(name: String, bytes: &[u8]) -> GraphResult<AttrDescriptor> {
    if bytes.len() != 24 {
        return Err(GraphError::corrupt("attribute descriptor must be 24 bytes"));
    }
    let mut r = Reader::new(bytes);
    let base_type = base_type_from_code(r.u8()?)?;
    let _reserved = r.u8()?;
    let flags = r.u16()?;
    if flags != 0 {
        return Err(GraphError::not_supported("non-zero attribute flags are not supported in v1.0.0"));
    }
    let dimension = r.u32()?;
    let _storage_width = r.u32()?;
    let _reserved = r.u32()?;
    let capacity = r.u64()? as u32;
    Ok(AttrDescriptor { name, base_type, dimension, capacity })
}

fn encode_values(attr: &Attribute) -> Vec<u8> {
    let capacity = attr.capacity;
    let dim = attr.dimension;
    match &attr.buffer {
        AttrBuffer::Bool(v) => v.clone(),
        AttrBuffer::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::F64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::U32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::I64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::U64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::Category { codes, .. } => codes.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttrBuffer::String(v) => {
            let mut out = Vec::new();
            for slot in v.iter() {
                match slot {
                    Some(s) => {
                        let b = s.as_bytes();
                        out.extend_from_slice(&(b.len() as u32).to_le_bytes());
                        out.extend_from_slice(b);
                    }
                    None => out.extend_from_slice(&u32::MAX.to_le_bytes()),
                }
            }
            let _ = dim;
            out
        }
        AttrBuffer::MultiCategory(store) => {
            let mut out = Vec::new();
            for i in 0..capacity {
                let (ids, weights) = store.row(i);
                out.extend_from_slice(&(ids.len() as u32).to_le_bytes());
                for &id in ids {
                    out.extend_from_slice(&id.to_le_bytes());
                }
                out.push(weights.is_some() as u8);
                if let Some(w) = weights {
                    for &x in w {
                        out.extend_from_slice(&x.to_le_bytes());
                    }
                }
            }
            out
        }
        AttrBuffer::OpaqueData(_) | AttrBuffer::HostShadow(_) => Vec::new(),
    }
}

fn decode_values_into(
    graph: &mut Graph,
    scope: Scope,
    name: &str,
    base_type: BaseType,
    dimension: u32,
    capacity: u32,
    bytes: &[u8],
) -> GraphResult<()> {
    let mut r = Reader::new(bytes);
    match base_type {
        BaseType::Bool => {
            for slot in 0..capacity {
                let v = r.u8()?;
                graph.set_value_f64(scope, name, slot, 0, v as f64)?;
            }
        }
        BaseType::F32 | BaseType::I32 | BaseType::U32 | BaseType::Category => {
            for slot in 0..capacity {
                for c in 0..dimension {
                    let raw = r.take(4)?;
                    let v = u32::from_le_bytes(raw.try_into().unwrap());
                    let as_f64 = match base_type {
                        BaseType::F32 => f32::from_le_bytes(raw.try_into().unwrap()) as f64,
                        BaseType::I32 | BaseType::Category => v as i32 as f64,
                        BaseType::U32 => v as f64,
                        _ => unreachable!(),
                    };
                    if base_type == BaseType::Category {
                        if let AttrBuffer::Category { codes, .. } =
                            &mut graph.get_attribute_mut(scope, name)?.buffer
                        {
                            codes[slot as usize] = as_f64 as i32;
                        }
                    } else {
                        graph.set_value_f64(scope, name, slot, c, as_f64)?;
                    }
                }
            }
        }
        BaseType::F64 | BaseType::I64 | BaseType::U64 => {
            for slot in 0..capacity {
                for c in 0..dimension {
                    let raw = r.take(8)?;
                    let as_f64 = match base_type {
                        BaseType::F64 => f64::from_le_bytes(raw.try_into().unwrap()),
                        BaseType::I64 => i64::from_le_bytes(raw.try_into().unwrap()) as f64,
                        BaseType::U64 => u64::from_le_bytes(raw.try_into().unwrap()) as f64,
                        _ => unreachable!(),
                    };
                    graph.set_value_f64(scope, name, slot, c, as_f64)?;
                }
            }
        }
        BaseType::String => {
            for slot in 0..capacity {
                let len = r.u32()?;
                if len == u32::MAX {
                    graph.set_value_string(scope, name, slot, None)?;
                } else {
                    let bytes = r.take(len as usize)?;
                    let s = String::from_utf8(bytes.to_vec())
                        .map_err(|_| GraphError::corrupt("string value is not valid utf-8"))?;
                    graph.set_value_string(scope, name, slot, Some(&s))?;
                }
            }
        }
        BaseType::MultiCategory => {
            for slot in 0..capacity {
                let n = r.u32()? as usize;
                let mut ids = Vec::with_capacity(n);
                for _ in 0..n {
                    ids.push(i32::from_le_bytes(r.take(4)?.try_into().unwrap()));
                }
                let has_weights = r.u8()? != 0;
                let weights = if has_weights {
                    let mut w = Vec::with_capacity(n);
                    for _ in 0..n {
                        w.push(f32::from_le_bytes(r.take(4)?.try_into().unwrap()));
                    }
                    Some(w)
                } else {
                    None
                };
                graph.get_attribute_mut(scope, name)?.set_multi_category_entry(
                    slot,
                    &ids,
                    weights.as_deref(),
                )?;
            }
        }
        BaseType::OpaqueData | BaseType::HostShadow => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct BxnetWriteOptions {
    /// `None` writes an uncompressed `.bxnet` stream; `Some(level)` wraps
    /// the chunk stream in a single BGZF-style gzip member for `.zxnet`.
    pub compression_level: Option<u32>,
}

impl Default for BxnetWriteOptions {
    fn default() -> Self {
        BxnetWriteOptions { compression_level: None }
    }
}

/// Returns the names of every attribute in `scope`, failing per spec
/// §4.7.2/§7 `not_supported` if any of them is opaque/host-shadow — those
/// attributes make the entire serialize fail, they are never silently
/// dropped.
fn serializable_names(graph: &Graph, scope: Scope) -> GraphResult<Vec<String>> {
    let names = graph.attribute_names(scope);
    for name in &names {
        let attr = graph.get_attribute(scope, name)?;
        if !attr.base_type.is_serializable() {
            return Err(GraphError::not_supported(format!(
                "attribute '{name}' is opaque/host-shadow and cannot be serialised to BXNet"
            )));
        }
    }
    Ok(names)
}

pub fn write_bxnet<W: Write>(graph: &Graph, w: &mut W, opts: BxnetWriteOptions) -> GraphResult<()> {
    let node_capacity = graph.node_capacity();
    let edge_capacity = graph.edge_capacity();

    let node_chunk = {
        let mut p = Vec::new();
        write_block(&mut p, &bits_to_bytes(node_capacity, |i| graph.node_active(i)));
        p
    };
    let edge_chunk = {
        let mut p = Vec::new();
        write_block(&mut p, &bits_to_bytes(edge_capacity, |i| graph.edge_active(i)));
        let mut pairs = Vec::with_capacity(edge_capacity as usize * 16);
        for e in 0..edge_capacity {
            let (u, v) = if graph.edge_active(e) { graph.edge_endpoints(e)? } else { (0, 0) };
            pairs.extend_from_slice(&(u as u64).to_le_bytes());
            pairs.extend_from_slice(&(v as u64).to_le_bytes());
        }
        write_block(&mut p, &pairs);
        p
    };

    let node_names = serializable_names(graph, Scope::Node)?;
    let edge_names = serializable_names(graph, Scope::Edge)?;
    let net_names = serializable_names(graph, Scope::Graph)?;

    let attr_chunk = |names: &[String], scope: Scope| -> GraphResult<Vec<u8>> {
        let mut p = Vec::new();
        let mut count_block = vec![0u8; 8];
        count_block[0..4].copy_from_slice(&(names.len() as u32).to_le_bytes());
        write_block(&mut p, &count_block);
        for name in names {
            let attr = graph.get_attribute(scope, name)?;
            write_block(&mut p, name.as_bytes());
            write_block(&mut p, &encode_attr_descriptor(attr));
            write_block(&mut p, &[]); // dictionary block: currently empty, spec §4.7.2
        }
        Ok(p)
    };
    let values_chunk = |names: &[String], scope: Scope| -> GraphResult<Vec<u8>> {
        let mut p = Vec::new();
        let mut count_block = vec![0u8; 8];
        count_block[0..4].copy_from_slice(&(names.len() as u32).to_le_bytes());
        write_block(&mut p, &count_block);
        for name in names {
            let attr = graph.get_attribute(scope, name)?;
            write_block(&mut p, name.as_bytes());
            write_block(&mut p, &encode_values(attr));
        }
        Ok(p)
    };

    let meta_chunk = {
        // 64-byte block: directed flag, node/edge counts, capacities, and
        // three attribute counts (spec §4.7.2 "META payload").
        let mut block = vec![0u8; 64];
        block[0] = graph.directed as u8;
        block[8..16].copy_from_slice(&(graph.node_count() as u64).to_le_bytes());
        block[16..24].copy_from_slice(&(graph.edge_count() as u64).to_le_bytes());
        block[24..32].copy_from_slice(&(node_capacity as u64).to_le_bytes());
        block[32..40].copy_from_slice(&(edge_capacity as u64).to_le_bytes());
        block[40..44].copy_from_slice(&(node_names.len() as u32).to_le_bytes());
        block[44..48].copy_from_slice(&(edge_names.len() as u32).to_le_bytes());
        block[48..52].copy_from_slice(&(net_names.len() as u32).to_le_bytes());
        let mut p = Vec::new();
        write_block(&mut p, &block);
        p
    };

    let chunk_payloads: [Vec<u8>; 9] = [
        meta_chunk,
        node_chunk,
        edge_chunk,
        attr_chunk(&node_names, Scope::Node)?,
        attr_chunk(&edge_names, Scope::Edge)?,
        attr_chunk(&net_names, Scope::Graph)?,
        values_chunk(&node_names, Scope::Node)?,
        values_chunk(&edge_names, Scope::Edge)?,
        values_chunk(&net_names, Scope::Graph)?,
    ];

    let mut chunk_stream = Vec::new();
    let mut locators = Vec::with_capacity(CHUNK_ORDER.len());
    for (id, payload) in CHUNK_ORDER.iter().zip(chunk_payloads.iter()) {
        let offset = chunk_stream.len() as u64;
        chunk_stream.extend_from_slice(&id.to_le_bytes());
        chunk_stream.extend_from_slice(&0u32.to_le_bytes()); // flags
        chunk_stream.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        chunk_stream.extend_from_slice(payload);
        let length = chunk_stream.len() as u64 - offset;
        locators.push((*id, offset, length));
    }

    let (codec, body) = match opts.compression_level {
        Some(level) => (CODEC_GZIP, bgzf::compress(&chunk_stream, level)?),
        None => (CODEC_NONE, chunk_stream),
    };

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(HEADER_MAGIC);
    header.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
    header.extend_from_slice(&VERSION_MINOR.to_le_bytes());
    header.extend_from_slice(&VERSION_PATCH.to_le_bytes());
    header.extend_from_slice(&codec.to_le_bytes());
    let flags = if graph.directed { FLAG_DIRECTED } else { 0 };
    header.extend_from_slice(&flags.to_le_bytes());
    header.extend_from_slice(&0u64.to_le_bytes()); // reserved
    header.extend_from_slice(&(graph.node_count() as u64).to_le_bytes());
    header.extend_from_slice(&(graph.edge_count() as u64).to_le_bytes());
    header.extend_from_slice(&(node_capacity as u64).to_le_bytes());
    header.extend_from_slice(&(edge_capacity as u64).to_le_bytes());
    debug_assert_eq!(header.len(), HEADER_LEN);

    let mut crc = Crc32::new();
    crc.update(&body);
    let crc_value = crc.finalize();

    let mut footer = Vec::with_capacity(FOOTER_LEN);
    footer.extend_from_slice(FOOTER_MAGIC);
    footer.extend_from_slice(&(locators.len() as u32).to_le_bytes());
    footer.extend_from_slice(&0u32.to_le_bytes()); // reserved
    for &(id, offset, length) in &locators {
        footer.extend_from_slice(&id.to_le_bytes());
        footer.extend_from_slice(&0u32.to_le_bytes()); // flags
        footer.extend_from_slice(&offset.to_le_bytes());
        footer.extend_from_slice(&length.to_le_bytes());
    }
    for _ in locators.len()..MAX_LOCATORS {
        footer.extend_from_slice(&[0u8; LOCATOR_LEN]);
    }
    // count block duplicating node/edge/attribute counts (spec §4.7.2 footer layout)
    footer.extend_from_slice(&(graph.node_count() as u64).to_le_bytes());
    footer.extend_from_slice(&(graph.edge_count() as u64).to_le_bytes());
    footer.extend_from_slice(&(node_names.len() as u64).to_le_bytes());
    footer.extend_from_slice(&(edge_names.len() as u64).to_le_bytes());
    footer.extend_from_slice(&(net_names.len() as u64).to_le_bytes());
    footer.extend_from_slice(&crc_value.to_le_bytes());
    footer.extend_from_slice(&0u32.to_le_bytes()); // reserved
    debug_assert_eq!(footer.len(), FOOTER_LEN);

    w.write_all(&header)?;
    w.write_all(&body)?;
    w.write_all(&footer)?;
    Ok(())
}

pub fn read_bxnet<R: Read>(r: &mut R) -> GraphResult<Graph> {
    let mut all = Vec::new();
    r.read_to_end(&mut all)?;
    if all.len() < HEADER_LEN + FOOTER_LEN {
        return Err(GraphError::corrupt("file too short for a ZXNet container"));
    }

    let header = &all[0..HEADER_LEN];
    if &header[0..8] != HEADER_MAGIC {
        return Err(GraphError::corrupt("bad header magic"));
    }
    let version_major = u16::from_le_bytes(header[8..10].try_into().unwrap());
    let version_minor = u16::from_le_bytes(header[10..12].try_into().unwrap());
    let version_patch = u32::from_le_bytes(header[12..16].try_into().unwrap());
    if (version_major, version_minor, version_patch) != (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH) {
        return Err(GraphError::corrupt(format!(
            "unsupported format version {version_major}.{version_minor}.{version_patch}"
        )));
    }
    let codec = u32::from_le_bytes(header[16..20].try_into().unwrap());
    let flags = u32::from_le_bytes(header[20..24].try_into().unwrap());
    let directed = flags & FLAG_DIRECTED != 0;
    let node_count = u64::from_le_bytes(header[32..40].try_into().unwrap()) as u32;
    let edge_count = u64::from_le_bytes(header[40..48].try_into().unwrap()) as u32;
    let node_capacity = u64::from_le_bytes(header[48..56].try_into().unwrap()) as u32;
    let edge_capacity = u64::from_le_bytes(header[56..64].try_into().unwrap()) as u32;

    let footer = &all[all.len() - FOOTER_LEN..];
    if &footer[0..8] != FOOTER_MAGIC {
        return Err(GraphError::corrupt("bad footer magic"));
    }
    let chunk_count = u32::from_le_bytes(footer[8..12].try_into().unwrap()) as usize;
    if chunk_count != CHUNK_ORDER.len() {
        return Err(GraphError::corrupt(format!(
            "unexpected chunk count {chunk_count}, expected {}",
            CHUNK_ORDER.len()
        )));
    }
    if chunk_count > MAX_LOCATORS {
        return Err(GraphError::not_supported("chunk count exceeds the 30-slot footer locator table"));
    }
    let locators_base = 16;
    let mut locators = Vec::with_capacity(chunk_count);
    for i in 0..chunk_count {
        let base = locators_base + i * LOCATOR_LEN;
        let id = u32::from_le_bytes(footer[base..base + 4].try_into().unwrap());
        let _flags = u32::from_le_bytes(footer[base + 4..base + 8].try_into().unwrap());
        let offset = u64::from_le_bytes(footer[base + 8..base + 16].try_into().unwrap());
        let length = u64::from_le_bytes(footer[base + 16..base + 24].try_into().unwrap());
        locators.push((id, offset, length));
    }
    let count_base = locators_base + MAX_LOCATORS * LOCATOR_LEN;
    let footer_node_count = u64::from_le_bytes(footer[count_base..count_base + 8].try_into().unwrap());
    let footer_edge_count = u64::from_le_bytes(footer[count_base + 8..count_base + 16].try_into().unwrap());
    if footer_node_count != node_count as u64 || footer_edge_count != edge_count as u64 {
        return Err(GraphError::corrupt("footer count block disagrees with header"));
    }
    let crc_off = count_base + 40;
    let expected_crc = u32::from_le_bytes(footer[crc_off..crc_off + 4].try_into().unwrap());

    let body = &all[HEADER_LEN..all.len() - FOOTER_LEN];
    let mut crc = Crc32::new();
    crc.update(body);
    if crc.finalize() != expected_crc {
        return Err(GraphError::corrupt("CRC32 mismatch: container is corrupt"));
    }

    let chunk_stream = match codec {
        CODEC_NONE => body.to_vec(),
        CODEC_GZIP => bgzf::decompress(body)?,
        other => return Err(GraphError::corrupt(format!("unknown codec {other}"))),
    };

    let mut chunks = std::collections::HashMap::new();
    for &(id, offset, length) in &locators {
        let frame = chunk_stream
            .get(offset as usize..(offset + length) as usize)
            .ok_or_else(|| GraphError::corrupt("chunk locator out of range"))?;
        let mut fr = Reader::new(frame);
        let frame_id = fr.u32()?;
        if frame_id != id {
            return Err(GraphError::corrupt("chunk id mismatch with locator table"));
        }
        let _flags = fr.u32()?;
        let payload_size = fr.u64()? as usize;
        let payload = fr.take(payload_size)?;
        if fr.remaining() != 0 {
            return Err(GraphError::corrupt("trailing bytes after chunk payload"));
        }
        chunks.insert(id, payload);
    }
    for id in CHUNK_ORDER {
        if !chunks.contains_key(&id) {
            return Err(GraphError::corrupt(format!("missing chunk {id}")));
        }
    }

    let node_payload = chunks[&CHUNK_NODE];
    let mut nr = Reader::new(node_payload);
    let node_bitmap = nr.block()?;
    let node_active_bits = bytes_to_bits(node_bitmap, node_capacity);
    if node_active_bits.iter().filter(|&&b| b).count() as u32 != node_count {
        return Err(GraphError::corrupt("node active count disagrees with header"));
    }

    let edge_payload = chunks[&CHUNK_EDGE];
    let mut er = Reader::new(edge_payload);
    let edge_bitmap = er.block()?;
    let edge_active_bits = bytes_to_bits(edge_bitmap, edge_capacity);
    if edge_active_bits.iter().filter(|&&b| b).count() as u32 != edge_count {
        return Err(GraphError::corrupt("edge active count disagrees with header"));
    }
    let pairs = er.block()?;
    if pairs.len() != edge_capacity as usize * 16 {
        return Err(GraphError::corrupt("edge endpoint block has the wrong length"));
    }
    let mut edge_pairs = Vec::with_capacity(edge_capacity as usize);
    for e in 0..edge_capacity as usize {
        if edge_active_bits[e] {
            let base = e * 16;
            let u = u64::from_le_bytes(pairs[base..base + 8].try_into().unwrap()) as u32;
            let v = u64::from_le_bytes(pairs[base + 8..base + 16].try_into().unwrap()) as u32;
            edge_pairs.push(Some((u, v)));
        } else {
            edge_pairs.push(None);
        }
    }

    let mut graph = Graph::from_snapshot(directed, node_capacity, &node_active_bits, edge_capacity, &edge_pairs)?;

    load_scope_attrs(&mut graph, Scope::Node, node_capacity, chunks[&CHUNK_NODE_ATTR], chunks[&CHUNK_NODE_VALUES])?;
    load_scope_attrs(&mut graph, Scope::Edge, edge_capacity, chunks[&CHUNK_EDGE_ATTR], chunks[&CHUNK_EDGE_VALUES])?;
    load_scope_attrs(&mut graph, Scope::Graph, 1, chunks[&CHUNK_NET_ATTR], chunks[&CHUNK_NET_VALUES])?;

    Ok(graph)
}

fn load_scope_attrs(
    graph: &mut Graph,
    scope: Scope,
    capacity: u32,
    attr_payload: &[u8],
    values_payload: &[u8],
) -> GraphResult<()> {
    let mut ar = Reader::new(attr_payload);
    let count_block = ar.block()?;
    let count = u32::from_le_bytes(count_block[0..4].try_into().unwrap());
    let mut descriptors = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = String::from_utf8(ar.block()?.to_vec())
            .map_err(|_| GraphError::corrupt("attribute name is not valid utf-8"))?;
        let descriptor = decode_attr_descriptor(name, ar.block()?)?;
        let _dictionary = ar.block()?; // currently always empty, spec §4.7.2
        descriptors.push(descriptor);
    }

    let mut vr = Reader::new(values_payload);
    let values_count_block = vr.block()?;
    let values_count = u32::from_le_bytes(values_count_block[0..4].try_into().unwrap());
    if values_count != count {
        return Err(GraphError::corrupt("value chunk attribute count disagrees with definition chunk"));
    }
    for d in &descriptors {
        if d.capacity != capacity {
            return Err(GraphError::corrupt("attribute descriptor capacity disagrees with scope capacity"));
        }
        graph.define_attribute(scope, &d.name, d.base_type, d.dimension)?;
        let value_name = String::from_utf8(vr.block()?.to_vec())
            .map_err(|_| GraphError::corrupt("attribute name is not valid utf-8"))?;
        if value_name != d.name {
            return Err(GraphError::corrupt("value chunk attribute order disagrees with definition chunk"));
        }
        let payload = vr.block()?;
        decode_values_into(graph, scope, &d.name, d.base_type, d.dimension, capacity, payload)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::BaseType;

    fn sample_graph() -> Graph {
        let mut g = Graph::new(true, 0, 0);
        g.add_nodes(4).unwrap();
        g.remove_nodes(&[1]).unwrap();
        g.add_edges(&[(0, 2), (2, 3)]).unwrap();
        g.define_attribute(Scope::Node, "weight", BaseType::F64, 1).unwrap();
        g.set_value_f64(Scope::Node, "weight", 0, 0, 1.0).unwrap();
        g.set_value_f64(Scope::Node, "weight", 2, 0, 2.0).unwrap();
        g.set_value_f64(Scope::Node, "weight", 3, 0, 3.0).unwrap();
        g.define_attribute(Scope::Edge, "label", BaseType::String, 1).unwrap();
        g.set_value_string(Scope::Edge, "label", 0, Some("a->c")).unwrap();
        g
    }

    #[test]
    fn uncompressed_round_trip_preserves_indices_and_holes() {
        let g = sample_graph();
        let mut buf = Vec::new();
        write_bxnet(&g, &mut buf, BxnetWriteOptions::default()).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let back = read_bxnet(&mut cursor).unwrap();

        assert!(!back.node_active(1));
        assert!(back.node_active(0) && back.node_active(2) && back.node_active(3));
        assert_eq!(back.get_value_f64(Scope::Node, "weight", 2, 0).unwrap(), 2.0);
        assert_eq!(back.get_value_string(Scope::Edge, "label", 0).unwrap().as_deref(), Some("a->c"));
    }

    #[test]
    fn compressed_round_trip_matches_uncompressed() {
        let g = sample_graph();
        let mut buf = Vec::new();
        write_bxnet(&g, &mut buf, BxnetWriteOptions { compression_level: Some(6) }).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let back = read_bxnet(&mut cursor).unwrap();
        assert_eq!(back.node_count(), 3);
        assert_eq!(back.edge_count(), 2);
    }

    #[test]
    fn corrupt_crc_is_rejected() {
        let g = sample_graph();
        let mut buf = Vec::new();
        write_bxnet(&g, &mut buf, BxnetWriteOptions::default()).unwrap();
        buf[HEADER_LEN + 4] ^= 0xFF; // flip a byte inside the chunk stream body
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_bxnet(&mut cursor).is_err());
    }

    #[test]
    fn header_layout_matches_documented_offsets() {
        let g = Graph::new(true, 2, 1);
        let mut buf = Vec::new();
        write_bxnet(&g, &mut buf, BxnetWriteOptions::default()).unwrap();
        assert_eq!(&buf[0..8], HEADER_MAGIC);
        assert_eq!(u16::from_le_bytes(buf[8..10].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(buf[20..24].try_into().unwrap()) & FLAG_DIRECTED, FLAG_DIRECTED);
        assert_eq!(u64::from_le_bytes(buf[48..56].try_into().unwrap()), 2);
        assert_eq!(u64::from_le_bytes(buf[56..64].try_into().unwrap()), 1);
    }

    #[test]
    fn opaque_attribute_fails_serialize_instead_of_being_dropped() {
        let mut g = Graph::new(false, 0, 0);
        g.add_nodes(1).unwrap();
        g.define_attribute(Scope::Node, "shadow", BaseType::HostShadow, 1).unwrap();
        let mut buf = Vec::new();
        let err = write_bxnet(&g, &mut buf, BxnetWriteOptions::default()).unwrap_err();
        assert!(matches!(err, GraphError::NotSupported(_)));
    }

    #[test]
    fn footer_locators_are_24_bytes_with_trailing_count_block() {
        let g = sample_graph();
        let mut buf = Vec::new();
        write_bxnet(&g, &mut buf, BxnetWriteOptions::default()).unwrap();
        let footer = &buf[buf.len() - FOOTER_LEN..];
        assert_eq!(&footer[0..8], FOOTER_MAGIC);
        assert_eq!(u32::from_le_bytes(footer[8..12].try_into().unwrap()), CHUNK_ORDER.len() as u32);
        let count_base = 16 + MAX_LOCATORS * LOCATOR_LEN;
        assert_eq!(u64::from_le_bytes(footer[count_base..count_base + 8].try_into().unwrap()), 3);
        assert_eq!(u64::from_le_bytes(footer[count_base + 8..count_base + 16].try_into().unwrap()), 2);
    }
}
