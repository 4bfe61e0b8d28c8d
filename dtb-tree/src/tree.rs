//! The indexed device tree: construction and queries.
//!
//! [`DtbTree::from_bytes`] validates the header, sizes the record tables
//! from a single pre-scan of the structure block, then builds the whole
//! tree by recursive descent. After construction the tree is immutable;
//! every query is a pure read and a `&DtbTree` may be shared freely.
//!
//! Child and property lists are built by prepending, so all iteration
//! runs in reverse-of-blob order. The node *table* keeps blob pre-order,
//! which is the order [`DtbTree::find_compatible`] scans in.

use core::fmt;

use log::{debug, warn};

use crate::data::{cells_for, string_at, Cells};
use crate::define::Token;
use crate::header::Header;
use crate::node::{Node, NodeRef};
use crate::property::Property;
use crate::table::{Idx, Table, STATIC_NODE_CAPACITY, STATIC_PROP_CAPACITY};
use crate::{FdtError, Phandle};

/// Cell widths a node hands down to its children.
#[derive(Clone, Copy)]
struct CellWidths {
    address: u8,
    size: u8,
}

impl Default for CellWidths {
    /// Root defaults per the Devicetree Specification.
    fn default() -> Self {
        CellWidths {
            address: 2,
            size: 1,
        }
    }
}

/// A device tree blob parsed into an indexed tree.
///
/// Borrows the blob for `'a`; node names and property values are slices
/// into it, never copies.
#[derive(Debug)]
pub struct DtbTree<'a> {
    header: Header,
    cells: Cells<'a>,
    strings: &'a [u8],
    pub(crate) nodes: Table<Node<'a>, STATIC_NODE_CAPACITY>,
    pub(crate) props: Table<Property<'a>, STATIC_PROP_CAPACITY>,
    /// Indexed directly by handle value; one slot per counted node.
    phandles: Table<Idx, STATIC_NODE_CAPACITY>,
    /// Head of the top-level node chain. The Devicetree Specification
    /// allows a single root, but extra top-level nodes are kept as its
    /// siblings.
    root: Idx,
}

impl<'a> DtbTree<'a> {
    /// Parses a device tree blob from a byte slice.
    ///
    /// # Errors
    ///
    /// Fails on a bad magic number, a blob shorter than the header
    /// claims, a node without its END_NODE tag, or (in static mode)
    /// compile-time capacities too small for this blob. On any error no
    /// tree is built.
    pub fn from_bytes(data: &'a [u8]) -> Result<DtbTree<'a>, FdtError> {
        let header = Header::from_bytes(data)?;
        if data.len() < header.totalsize as usize {
            return Err(FdtError::BufferTooSmall {
                pos: header.totalsize as usize,
            });
        }

        let struct_end = header.off_dt_struct as usize + header.size_dt_struct as usize;
        let struct_block = data
            .get(header.off_dt_struct as usize..struct_end)
            .ok_or(FdtError::BufferTooSmall { pos: struct_end })?;

        let strings_end = header.off_dt_strings as usize + header.size_dt_strings as usize;
        let strings = data
            .get(header.off_dt_strings as usize..strings_end)
            .ok_or(FdtError::BufferTooSmall { pos: strings_end })?;

        let cells = Cells::new(struct_block);
        let (node_count, prop_count) = pre_scan(&cells);

        let mut phandles = Table::with_capacity(node_count)?;
        for _ in 0..node_count {
            phandles.push(Idx::NONE)?;
        }

        let mut tree = DtbTree {
            header,
            cells,
            strings,
            nodes: Table::with_capacity(node_count)?,
            props: Table::with_capacity(prop_count)?,
            phandles,
            root: Idx::NONE,
        };
        tree.parse()?;

        debug!(
            "built device tree: {} nodes, {} properties",
            tree.nodes.len(),
            tree.props.len()
        );
        Ok(tree)
    }

    /// Parses a device tree blob starting at a raw base address.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a complete device tree blob that stays valid
    /// and unmodified for `'a`.
    pub unsafe fn from_ptr(ptr: *const u8) -> Result<DtbTree<'a>, FdtError> {
        if ptr.is_null() {
            return Err(FdtError::InvalidPtr);
        }
        let header = Header::from_bytes(core::slice::from_raw_parts(ptr, Header::SIZE))?;
        let data = core::slice::from_raw_parts(ptr, header.totalsize as usize);
        Self::from_bytes(data)
    }

    /// The validated blob header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of properties across all nodes.
    pub fn prop_count(&self) -> usize {
        self.props.len()
    }

    /// The root node, if the blob contained one.
    pub fn root(&self) -> Option<NodeRef<'_, 'a>> {
        self.node_at(self.root)
    }

    /// Resolves a slash-separated path.
    ///
    /// Leading, trailing, and repeated slashes are permitted; `""` and
    /// `"/"` return the root. Each segment matches a child name on the
    /// prefix before `'@'` (the unit address is never matched).
    pub fn find(&self, path: &str) -> Option<NodeRef<'_, 'a>> {
        let mut node = self.root()?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node.find_child(segment)?;
        }
        Some(node)
    }

    /// Finds the next node whose `compatible` list contains `compatible`.
    ///
    /// Scans the node table — blob pre-order — starting just past
    /// `start`, or from the beginning when `start` is `None`. Feeding
    /// each hit back in enumerates every matching node; `None` means the
    /// table is exhausted.
    pub fn find_compatible<'t>(
        &'t self,
        start: Option<NodeRef<'t, 'a>>,
        compatible: &str,
    ) -> Option<NodeRef<'t, 'a>> {
        let begin = match start {
            Some(node) => node.slot + 1,
            None => 0,
        };
        (begin..self.nodes.len())
            .map(|slot| NodeRef { tree: self, slot })
            .find(|node| node.compatibles().any(|c| c == compatible))
    }

    /// Iterator form of [`find_compatible`](Self::find_compatible).
    pub fn iter_compatible<'t>(&'t self, compatible: &'t str) -> CompatibleIter<'t, 'a> {
        CompatibleIter {
            tree: self,
            compatible,
            next_slot: 0,
        }
    }

    /// Looks up a node by its phandle, `None` for unknown or
    /// out-of-range handles.
    pub fn find_phandle(&self, phandle: Phandle) -> Option<NodeRef<'_, 'a>> {
        let idx = *self.phandles.get(phandle.as_usize())?;
        self.node_at(idx)
    }

    /// Iterates every node in blob pre-order.
    pub fn all_nodes(&self) -> AllNodesIter<'_, 'a> {
        AllNodesIter {
            tree: self,
            next_slot: 0,
        }
    }

    pub(crate) fn root_head(&self) -> Idx {
        self.root
    }

    fn node_at(&self, idx: Idx) -> Option<NodeRef<'_, 'a>> {
        idx.get().map(|slot| NodeRef { tree: self, slot })
    }

    /// Consumes the token stream, linking top-level nodes as siblings in
    /// encounter order (the first becomes the root).
    fn parse(&mut self) -> Result<(), FdtError> {
        let mut offset = 0;
        let mut tail = Idx::NONE;
        while let Some(raw) = self.cells.get(offset) {
            match Token::from(raw) {
                Token::BeginNode => {
                    let node = self.parse_node(&mut offset, CellWidths::default())?;
                    match tail.get() {
                        None => self.root = Idx::new(node),
                        Some(prev) => self.nodes.as_mut_slice()[prev].next_sibling = Idx::new(node),
                    }
                    tail = Idx::new(node);
                }
                Token::End => break,
                _ => offset += 1,
            }
        }
        Ok(())
    }

    /// Parses one node and its subtree; the cursor sits on BEGIN_NODE.
    ///
    /// Children and properties are prepended as they appear, which is
    /// what makes iteration reverse-of-blob. A child recursion receives
    /// the cell widths this node has accumulated *so far*, so a node's
    /// own `#address-cells`/`#size-cells` apply to the children parsed
    /// after them.
    fn parse_node(&mut self, offset: &mut usize, inherited: CellWidths) -> Result<usize, FdtError> {
        let name = self.cells.name_at(*offset + 1)?;
        *offset += 1 + cells_for(name.len() + 1);

        let slot = self.nodes.push(Node {
            name,
            address_cells: inherited.address,
            size_cells: inherited.size,
            parent: Idx::NONE,
            first_child: Idx::NONE,
            next_sibling: Idx::NONE,
            first_prop: Idx::NONE,
        })?;

        loop {
            let raw = match self.cells.get(*offset) {
                Some(raw) => raw,
                None => return Err(FdtError::UnterminatedNode),
            };
            match Token::from(raw) {
                Token::EndNode => {
                    *offset += 1;
                    return Ok(slot);
                }
                Token::BeginNode => {
                    let widths = {
                        let node = &self.nodes.as_slice()[slot];
                        CellWidths {
                            address: node.address_cells,
                            size: node.size_cells,
                        }
                    };
                    let child = self.parse_node(offset, widths)?;
                    let nodes = self.nodes.as_mut_slice();
                    nodes[child].parent = Idx::new(slot);
                    nodes[child].next_sibling = nodes[slot].first_child;
                    nodes[slot].first_child = Idx::new(child);
                }
                Token::Prop => {
                    let prop = self.parse_prop(offset)?;
                    self.props.as_mut_slice()[prop].next = self.nodes.as_slice()[slot].first_prop;
                    self.nodes.as_mut_slice()[slot].first_prop = Idx::new(prop);
                    self.recognize_special(slot, prop);
                }
                // NOP, and any stray cell that is no token at all.
                _ => *offset += 1,
            }
        }
    }

    /// Parses one property; the cursor sits on PROP.
    fn parse_prop(&mut self, offset: &mut usize) -> Result<usize, FdtError> {
        let truncated = FdtError::BufferTooSmall {
            pos: (*offset + 3) * 4,
        };
        let len = self.cells.get(*offset + 1).ok_or(truncated.clone())? as usize;
        let nameoff = self.cells.get(*offset + 2).ok_or(truncated.clone())? as usize;
        let value = self.cells.bytes(*offset + 3, len).ok_or(truncated)?;
        let name = string_at(self.strings, nameoff)?;
        *offset += 3 + cells_for(len);

        self.props.push(Property {
            name,
            value,
            next: Idx::NONE,
        })
    }

    /// Applies `phandle`/`linux,phandle` and the cell-width overrides.
    ///
    /// Runs once per attached property. The override order matters:
    /// widths changed here are seen by children parsed afterwards, never
    /// by properties already attached to this node.
    fn recognize_special(&mut self, node_slot: usize, prop_slot: usize) {
        let prop = &self.props.as_slice()[prop_slot];
        // Every recognized name starts with '#', 'p', or 'l'.
        match prop.name.as_bytes().first() {
            Some(b'#' | b'p' | b'l') => {}
            _ => return,
        }
        match prop.name {
            "phandle" | "linux,phandle" => {
                let Some(handle) = prop.u32() else { return };
                match self.phandles.as_mut_slice().get_mut(handle as usize) {
                    Some(entry) => *entry = Idx::new(node_slot),
                    // Handles at or past the node count index nothing;
                    // the blob is suspect but the tree stays usable.
                    None => warn!("phandle {:#x} out of range, dropped", handle),
                }
            }
            "#address-cells" => {
                if let Some(v) = prop.u32() {
                    self.nodes.as_mut_slice()[node_slot].address_cells = v as u8;
                }
            }
            "#size-cells" => {
                if let Some(v) = prop.u32() {
                    self.nodes.as_mut_slice()[node_slot].size_cells = v as u8;
                }
            }
            _ => {}
        }
    }
}

/// Counts BEGIN_NODE and PROP occurrences across every cell.
///
/// Deliberately token-naive: name bytes and payloads are inspected too,
/// so the counts can only overcount. That makes them safe upper bounds
/// for sizing the tables.
fn pre_scan(cells: &Cells<'_>) -> (usize, usize) {
    let mut nodes = 0;
    let mut props = 0;
    for index in 0..cells.len() {
        match cells.get(index) {
            Some(0x1) => nodes += 1,
            Some(0x3) => props += 1,
            _ => {}
        }
    }
    (nodes, props)
}

/// Iterator over every node in blob pre-order.
pub struct AllNodesIter<'t, 'a> {
    tree: &'t DtbTree<'a>,
    next_slot: usize,
}

impl<'t, 'a> Iterator for AllNodesIter<'t, 'a> {
    type Item = NodeRef<'t, 'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_slot >= self.tree.nodes.len() {
            return None;
        }
        let node = NodeRef {
            tree: self.tree,
            slot: self.next_slot,
        };
        self.next_slot += 1;
        Some(node)
    }
}

/// Iterator over nodes matching one compatible string, in blob pre-order.
pub struct CompatibleIter<'t, 'a> {
    tree: &'t DtbTree<'a>,
    compatible: &'t str,
    next_slot: usize,
}

impl<'t, 'a> Iterator for CompatibleIter<'t, 'a> {
    type Item = NodeRef<'t, 'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_slot < self.tree.nodes.len() {
            let node = NodeRef {
                tree: self.tree,
                slot: self.next_slot,
            };
            self.next_slot += 1;
            if node.compatibles().any(|c| c == self.compatible) {
                return Some(node);
            }
        }
        None
    }
}

impl fmt::Display for DtbTree<'_> {
    /// DTS-style rendering. Children and properties print in
    /// reverse-of-blob order, matching iteration.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/dts-v1/;")?;
        writeln!(f)?;
        let mut cursor = self.root;
        while let Some(slot) = cursor.get() {
            self.write_node(f, NodeRef { tree: self, slot }, 0)?;
            cursor = self.nodes.as_slice()[slot].next_sibling;
        }
        Ok(())
    }
}

impl DtbTree<'_> {
    fn write_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        node: NodeRef<'_, '_>,
        depth: usize,
    ) -> fmt::Result {
        write_indent(f, depth)?;
        writeln!(f, "{} {{", node.name())?;
        for prop in node.properties() {
            write_indent(f, depth + 1)?;
            writeln!(f, "{};", prop)?;
        }
        for child in node.children() {
            self.write_node(f, child, depth + 1)?;
        }
        write_indent(f, depth)?;
        writeln!(f, "}};")
    }
}

fn write_indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str("    ")?;
    }
    Ok(())
}
