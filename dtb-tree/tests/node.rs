#![cfg(not(target_os = "none"))]

#[macro_use]
extern crate log;

use dtb_tree::DtbTree;
use std::sync::Once;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Trace)
            .try_init();
    });
}

fn sample_tree(raw: &[u8]) -> DtbTree<'_> {
    DtbTree::from_bytes(raw).unwrap()
}

#[test]
fn enumerates_every_begin_node() {
    init_logging();
    let raw = dtb_blob::sample();
    let tree = sample_tree(&raw);

    assert_eq!(tree.node_count(), dtb_blob::SAMPLE_NODE_COUNT);
    assert_eq!(tree.all_nodes().count(), dtb_blob::SAMPLE_NODE_COUNT);

    // The same nodes are reachable from the root.
    fn descend(node: dtb_tree::NodeRef<'_, '_>, seen: &mut usize) {
        *seen += 1;
        for child in node.children() {
            descend(child, seen);
        }
    }
    let mut seen = 0;
    descend(tree.root().unwrap(), &mut seen);
    assert_eq!(seen, dtb_blob::SAMPLE_NODE_COUNT);

    // Every parsed property hangs off exactly one node.
    let total: usize = tree.all_nodes().map(|n| n.properties().count()).sum();
    assert_eq!(tree.prop_count(), total);
}

#[test]
fn root_is_found_by_empty_and_slash_paths() {
    init_logging();
    let raw = dtb_blob::sample();
    let tree = sample_tree(&raw);

    let root = tree.root().unwrap();
    assert_eq!(root.name(), "/");
    assert_eq!(tree.find(""), Some(root));
    assert_eq!(tree.find("/"), Some(root));
}

#[test]
fn find_ignores_repeated_and_trailing_slashes() {
    init_logging();
    let raw = dtb_blob::sample();
    let tree = sample_tree(&raw);

    let plain = tree.find("/cpus/cpu-map/cluster0").unwrap();
    for path in [
        "cpus/cpu-map/cluster0",
        "/cpus/cpu-map/cluster0/",
        "//cpus//cpu-map///cluster0",
    ] {
        assert_eq!(tree.find(path), Some(plain), "path {:?}", path);
    }
    assert!(tree.find("/cpus/nope").is_none());
}

#[test]
fn segments_match_without_unit_address() {
    init_logging();
    let raw = dtb_blob::sample();
    let tree = sample_tree(&raw);

    let memory = tree.find("/memory").unwrap();
    assert_eq!(memory.name(), "memory@80000000");

    // The unit address is display-only; spelling it out matches nothing.
    assert!(tree.find("/memory@80000000").is_none());
}

#[test]
fn children_iterate_in_reverse_of_blob_order() {
    init_logging();
    let raw = dtb_blob::sample();
    let tree = sample_tree(&raw);

    let root = tree.root().unwrap();
    let names: Vec<&str> = root.children().map(|c| c.name()).collect();
    assert_eq!(names, ["soc", "cpus", "memory@80000000", "chosen"]);

    // Property lists are prepended the same way.
    let prop_names: Vec<&str> = root.properties().map(|p| p.name()).collect();
    assert_eq!(
        prop_names,
        ["#size-cells", "#address-cells", "compatible", "model"]
    );
    assert_eq!(root.property(0).unwrap().name(), "#size-cells");
    assert_eq!(root.property(3).unwrap().name(), "model");
    assert!(root.property(4).is_none());
}

#[test]
fn every_child_points_back_at_its_parent() {
    init_logging();
    let raw = dtb_blob::sample();
    let tree = sample_tree(&raw);

    for node in tree.all_nodes() {
        for child in node.children() {
            assert_eq!(child.parent(), Some(node));
        }
    }
    assert!(tree.root().unwrap().parent().is_none());
}

#[test]
fn sibling_chain_agrees_with_stat() {
    init_logging();
    let raw = dtb_blob::sample();
    let tree = sample_tree(&raw);

    for node in tree.all_nodes() {
        let stat = node.stat();

        let mut walked = 0;
        let mut cursor = node.first_child();
        while let Some(child) = cursor {
            walked += 1;
            cursor = child.next_sibling();
        }
        assert_eq!(walked, stat.child_count, "node {}", node.name());
        assert_eq!(node.properties().count(), stat.prop_count);
        info!(
            "{}: {} children, {} props, {} siblings",
            stat.name, stat.child_count, stat.prop_count, stat.sibling_count
        );
    }

    let cpus = tree.find("/cpus").unwrap().stat();
    assert_eq!(cpus.name, "cpus");
    assert_eq!(cpus.child_count, 3);
    assert_eq!(cpus.prop_count, 2);
    assert_eq!(cpus.sibling_count, 3);

    let root = tree.root().unwrap().stat();
    assert_eq!(root.name, "/");
    assert_eq!(root.child_count, 4);
    assert_eq!(root.sibling_count, 0);
}

#[test]
fn cell_widths_are_inherited_and_overridden() {
    init_logging();
    let raw = dtb_blob::sample();
    let tree = sample_tree(&raw);

    // Root overrides the default widths (2, 1) with its own properties.
    let root = tree.root().unwrap();
    assert_eq!((root.address_cells(), root.size_cells()), (2, 2));

    // chosen declares nothing and inherits the root's widths.
    let chosen = tree.find("/chosen").unwrap();
    assert_eq!((chosen.address_cells(), chosen.size_cells()), (2, 2));

    // cpus overrides; its whole subtree sees (1, 0).
    let cpus = tree.find("/cpus").unwrap();
    assert_eq!((cpus.address_cells(), cpus.size_cells()), (1, 0));
    let cpu = tree.find("/cpus/cpu").unwrap();
    assert_eq!((cpu.address_cells(), cpu.size_cells()), (1, 0));
    let core0 = tree.find("/cpus/cpu-map/cluster0/core0").unwrap();
    assert_eq!((core0.address_cells(), core0.size_cells()), (1, 0));

    let serial = tree.find("/soc/serial").unwrap();
    assert_eq!((serial.address_cells(), serial.size_cells()), (2, 2));
}

#[test]
fn paths_round_trip_through_find() {
    init_logging();
    let raw = dtb_blob::sample();
    let tree = sample_tree(&raw);

    assert_eq!(tree.root().unwrap().path().as_str(), "/");
    let core1 = tree.find("/cpus/cpu-map/cluster0/core1").unwrap();
    assert_eq!(core1.path().as_str(), "/cpus/cpu-map/cluster0/core1");

    for node in tree.all_nodes() {
        let path = node.path();
        // The reconstructed path names include unit addresses, which
        // find() does not match; strip them segment by segment. A
        // stripped path may collide with a same-named sibling (cpu@0 vs
        // cpu@1), so only the bare name is compared.
        let stripped: String = path
            .split('/')
            .map(|seg| seg.split('@').next().unwrap_or(seg))
            .collect::<Vec<_>>()
            .join("/");
        let found = tree.find(&stripped).unwrap_or_else(|| panic!("path {}", path));
        let bare = |s: &str| s.split('@').next().unwrap_or(s).to_owned();
        assert_eq!(bare(found.name()), bare(node.name()), "path {}", path);
    }
}

#[test]
fn extra_top_level_nodes_become_root_siblings() {
    init_logging();
    let mut b = dtb_blob::DtbBuilder::new();
    b.begin_node("");
    b.prop_str("model", "primary");
    b.end_node();
    b.begin_node("spare");
    b.end_node();
    let raw = b.finish();

    let tree = DtbTree::from_bytes(&raw).unwrap();
    let root = tree.root().unwrap();
    assert_eq!(root.name(), "/");
    let spare = root.next_sibling().unwrap();
    assert_eq!(spare.name(), "spare");
    assert!(spare.next_sibling().is_none());

    // find() only descends from the primary root.
    assert!(tree.find("/spare").is_none());
}

#[test]
fn nop_tokens_are_skipped() {
    init_logging();
    let mut b = dtb_blob::DtbBuilder::new();
    b.begin_node("");
    b.nop();
    b.begin_node("child");
    b.nop();
    b.prop_u32("value", 7);
    b.end_node();
    b.nop();
    b.end_node();
    let raw = b.finish();

    let tree = DtbTree::from_bytes(&raw).unwrap();
    assert_eq!(tree.node_count(), 2);
    let child = tree.find("/child").unwrap();
    assert_eq!(child.find_property("value").unwrap().u32(), Some(7));
}

#[test]
fn display_renders_dts_shape() {
    init_logging();
    let raw = dtb_blob::sample();
    let tree = sample_tree(&raw);

    let output = format!("{}", tree);
    info!("dts:\n{}", output);

    for pattern in [
        "/dts-v1/;",
        "/ {",
        "chosen {",
        "bootargs = \"console=ttyS0 root=/dev/vda rw\";",
        "#address-cells = <0x2>;",
        "ranges;",
        "};",
    ] {
        assert!(output.contains(pattern), "missing {:?}", pattern);
    }
}
