//! Node records and the node handle API.

use core::fmt;

use crate::property::Property;
use crate::table::Idx;
use crate::tree::DtbTree;
use crate::Phandle;

/// A node record in the tree's node table.
///
/// `name` borrows from the structure block; all links are table slots.
#[derive(Debug)]
pub(crate) struct Node<'a> {
    pub(crate) name: &'a str,
    /// Address/size cell widths, inherited from the parent at parse time
    /// and overridden by the node's own `#address-cells`/`#size-cells`.
    pub(crate) address_cells: u8,
    pub(crate) size_cells: u8,
    pub(crate) parent: Idx,
    pub(crate) first_child: Idx,
    pub(crate) next_sibling: Idx,
    pub(crate) first_prop: Idx,
}

/// Aggregate counts for a node, gathered in O(n) walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat<'a> {
    /// Display name; `"/"` for the root.
    pub name: &'a str,
    pub child_count: usize,
    pub prop_count: usize,
    /// Nodes other than this one on the containing sibling chain.
    pub sibling_count: usize,
}

/// A borrowed handle to one node of a [`DtbTree`].
///
/// Handles are cheap to copy and only valid as long as the tree they
/// came from.
#[derive(Clone, Copy)]
pub struct NodeRef<'t, 'a> {
    pub(crate) tree: &'t DtbTree<'a>,
    pub(crate) slot: usize,
}

impl<'t, 'a> NodeRef<'t, 'a> {
    fn record(&self) -> &'t Node<'a> {
        // Handles are only constructed for occupied slots.
        &self.tree.nodes.as_slice()[self.slot]
    }

    fn at(&self, idx: Idx) -> Option<NodeRef<'t, 'a>> {
        idx.get().map(|slot| NodeRef {
            tree: self.tree,
            slot,
        })
    }

    /// The node's name, with the unit address kept; `"/"` for the root.
    pub fn name(&self) -> &'a str {
        let name = self.record().name;
        if name.is_empty() {
            "/"
        } else {
            name
        }
    }

    /// `#address-cells` in effect for this node's children.
    pub fn address_cells(&self) -> u8 {
        self.record().address_cells
    }

    /// `#size-cells` in effect for this node's children.
    pub fn size_cells(&self) -> u8 {
        self.record().size_cells
    }

    pub fn parent(&self) -> Option<NodeRef<'t, 'a>> {
        self.at(self.record().parent)
    }

    pub fn first_child(&self) -> Option<NodeRef<'t, 'a>> {
        self.at(self.record().first_child)
    }

    pub fn next_sibling(&self) -> Option<NodeRef<'t, 'a>> {
        self.at(self.record().next_sibling)
    }

    /// Iterates this node's children, in reverse-of-blob order.
    pub fn children(&self) -> ChildIter<'t, 'a> {
        ChildIter {
            tree: self.tree,
            next: self.record().first_child,
        }
    }

    /// Iterates this node's properties, in reverse-of-blob order.
    pub fn properties(&self) -> PropIter<'t, 'a> {
        PropIter {
            tree: self.tree,
            next: self.record().first_prop,
        }
    }

    /// The `index`-th property in iteration order, or `None`.
    pub fn property(&self, index: usize) -> Option<&'t Property<'a>> {
        self.properties().nth(index)
    }

    /// Finds a direct child whose name before any `'@'` equals `name`.
    ///
    /// The unit-address suffix is display-only and never matched, so
    /// `"serial"` finds `serial@10000` while `"serial@10000"` finds
    /// nothing.
    pub fn find_child(&self, name: &str) -> Option<NodeRef<'t, 'a>> {
        self.children()
            .find(|child| name_matches(child.record().name, name))
    }

    /// Finds a property by exact full-name match.
    pub fn find_property(&self, name: &str) -> Option<&'t Property<'a>> {
        self.properties().find(|p| p.name == name)
    }

    /// The node's own `compatible` strings, if any.
    pub fn compatibles(&self) -> impl Iterator<Item = &'a str> + 't {
        self.find_property("compatible")
            .into_iter()
            .flat_map(|p| p.strings())
    }

    /// The node's `phandle` (or legacy `linux,phandle`) value.
    pub fn phandle(&self) -> Option<Phandle> {
        let prop = self
            .find_property("phandle")
            .or_else(|| self.find_property("linux,phandle"))?;
        Some(Phandle::from(prop.u32()?))
    }

    /// Counts children, properties, and siblings.
    ///
    /// Siblings are counted along the chain that contains this node: the
    /// parent's child chain, or the top-level chain for a root.
    pub fn stat(&self) -> NodeStat<'a> {
        let head = match self.parent() {
            Some(parent) => parent.record().first_child,
            None => self.tree.root_head(),
        };

        let mut sibling_count = 0;
        let mut cursor = head;
        while let Some(slot) = cursor.get() {
            if slot != self.slot {
                sibling_count += 1;
            }
            cursor = self.tree.nodes.as_slice()[slot].next_sibling;
        }

        NodeStat {
            name: self.name(),
            child_count: self.children().count(),
            prop_count: self.properties().count(),
            sibling_count,
        }
    }

    /// Reconstructs the absolute path of this node.
    ///
    /// Paths deeper than 16 levels or longer than the buffer are
    /// truncated at the overflowing component.
    pub fn path(&self) -> heapless::String<256> {
        let mut chain: heapless::Vec<usize, 16> = heapless::Vec::new();
        let mut cursor = Some(*self);
        while let Some(node) = cursor {
            if !node.record().name.is_empty() {
                let _ = chain.push(node.slot);
            }
            cursor = node.parent();
        }

        let mut path = heapless::String::new();
        if chain.is_empty() {
            let _ = path.push('/');
            return path;
        }
        for slot in chain.iter().rev() {
            let _ = path.push('/');
            let _ = path.push_str(self.tree.nodes.as_slice()[*slot].name);
        }
        path
    }
}

/// Whether `full` (a node name, possibly `name@unit-address`) matches
/// `name` on the prefix before `'@'`, byte-exact.
pub(crate) fn name_matches(full: &str, name: &str) -> bool {
    let bare = match full.find('@') {
        Some(at) => &full[..at],
        None => full,
    };
    bare == name
}

impl PartialEq for NodeRef<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.tree, other.tree) && self.slot == other.slot
    }
}
impl Eq for NodeRef<'_, '_> {}

impl fmt::Debug for NodeRef<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.name()).finish()
    }
}

/// Iterator over a sibling chain.
pub struct ChildIter<'t, 'a> {
    tree: &'t DtbTree<'a>,
    next: Idx,
}

impl<'t, 'a> Iterator for ChildIter<'t, 'a> {
    type Item = NodeRef<'t, 'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next.get()?;
        self.next = self.tree.nodes.as_slice()[slot].next_sibling;
        Some(NodeRef {
            tree: self.tree,
            slot,
        })
    }
}

/// Iterator over a node's property chain.
pub struct PropIter<'t, 'a> {
    tree: &'t DtbTree<'a>,
    next: Idx,
}

impl<'t, 'a> Iterator for PropIter<'t, 'a> {
    type Item = &'t Property<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next.get()?;
        let prop = &self.tree.props.as_slice()[slot];
        self.next = prop.next;
        Some(prop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_address_is_ignored_in_matching() {
        assert!(name_matches("serial@10000", "serial"));
        assert!(name_matches("serial", "serial"));
        assert!(!name_matches("serial@10000", "serial@10000"));
        assert!(!name_matches("serials@1", "serial"));
        assert!(!name_matches("cpu", "cpus"));
    }
}
