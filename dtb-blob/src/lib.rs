//! Test data for the device tree parser.
//!
//! Builds well-formed Device Tree Blob images in memory so the test
//! suites do not need binary fixtures. The builder emits the v17 layout:
//! header, memory-reservation terminator, structure block, strings block,
//! with all integers big-endian and names/payloads padded to 4 bytes.

const FDT_MAGIC: u32 = 0xd00dfeed;

const TOKEN_BEGIN_NODE: u32 = 0x1;
const TOKEN_END_NODE: u32 = 0x2;
const TOKEN_PROP: u32 = 0x3;
const TOKEN_NOP: u32 = 0x4;
const TOKEN_END: u32 = 0x9;

const HEADER_SIZE: u32 = 40;
const MEM_RSV_ENTRY_SIZE: u32 = 16;

/// Incremental DTB image builder.
///
/// Call `begin_node`/`end_node` and the `prop_*` methods in tree order,
/// then `finish` to get the complete blob.
pub struct DtbBuilder {
    struct_data: Vec<u8>,
    strings_data: Vec<u8>,
    string_offsets: Vec<(String, u32)>,
    boot_cpuid_phys: u32,
}

impl Default for DtbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DtbBuilder {
    pub fn new() -> Self {
        Self {
            struct_data: Vec::new(),
            strings_data: Vec::new(),
            string_offsets: Vec::new(),
            boot_cpuid_phys: 0,
        }
    }

    pub fn boot_cpuid_phys(&mut self, id: u32) -> &mut Self {
        self.boot_cpuid_phys = id;
        self
    }

    /// Gets or adds a property name in the strings block, returning its offset.
    fn get_or_add_string(&mut self, s: &str) -> u32 {
        for (existing, offset) in &self.string_offsets {
            if existing == s {
                return *offset;
            }
        }

        let offset = self.strings_data.len() as u32;
        self.strings_data.extend_from_slice(s.as_bytes());
        self.strings_data.push(0);
        self.string_offsets.push((s.into(), offset));
        offset
    }

    fn push_cell(&mut self, value: u32) {
        self.struct_data.extend_from_slice(&value.to_be_bytes());
    }

    fn push_padded(&mut self, bytes: &[u8]) {
        self.struct_data.extend_from_slice(bytes);
        while self.struct_data.len() % 4 != 0 {
            self.struct_data.push(0);
        }
    }

    pub fn begin_node(&mut self, name: &str) -> &mut Self {
        self.push_cell(TOKEN_BEGIN_NODE);
        let mut name_buf = name.as_bytes().to_vec();
        name_buf.push(0);
        self.push_padded(&name_buf);
        self
    }

    pub fn end_node(&mut self) -> &mut Self {
        self.push_cell(TOKEN_END_NODE);
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        self.push_cell(TOKEN_NOP);
        self
    }

    pub fn prop_bytes(&mut self, name: &str, data: &[u8]) -> &mut Self {
        self.push_cell(TOKEN_PROP);
        self.push_cell(data.len() as u32);
        let nameoff = self.get_or_add_string(name);
        self.push_cell(nameoff);
        self.push_padded(data);
        self
    }

    pub fn prop_empty(&mut self, name: &str) -> &mut Self {
        self.prop_bytes(name, &[])
    }

    pub fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.prop_bytes(name, &value.to_be_bytes())
    }

    pub fn prop_cells(&mut self, name: &str, cells: &[u32]) -> &mut Self {
        let mut data = Vec::with_capacity(cells.len() * 4);
        for cell in cells {
            data.extend_from_slice(&cell.to_be_bytes());
        }
        self.prop_bytes(name, &data)
    }

    /// A single string value, NUL-terminated.
    pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        self.prop_bytes(name, &data)
    }

    /// A NUL-separated string list, each entry terminated.
    pub fn prop_str_list(&mut self, name: &str, values: &[&str]) -> &mut Self {
        let mut data = Vec::new();
        for value in values {
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }
        self.prop_bytes(name, &data)
    }

    /// Seals the structure block and assembles the final image.
    pub fn finish(mut self) -> Vec<u8> {
        self.push_cell(TOKEN_END);

        let mem_rsv_size = MEM_RSV_ENTRY_SIZE; // terminator entry only
        let struct_size = self.struct_data.len() as u32;
        let strings_size = self.strings_data.len() as u32;

        let off_mem_rsvmap = HEADER_SIZE;
        let off_dt_struct = off_mem_rsvmap + mem_rsv_size;
        let off_dt_strings = off_dt_struct + struct_size;
        let totalsize = (off_dt_strings + strings_size + 3) & !3;

        let mut data = Vec::with_capacity(totalsize as usize);

        // Header
        for field in [
            FDT_MAGIC,
            totalsize,
            off_dt_struct,
            off_dt_strings,
            off_mem_rsvmap,
            17, // version
            16, // last_comp_version
            self.boot_cpuid_phys,
            strings_size,
            struct_size,
        ] {
            data.extend_from_slice(&field.to_be_bytes());
        }

        // Memory reservation block: terminator only
        data.extend_from_slice(&[0u8; MEM_RSV_ENTRY_SIZE as usize]);

        data.extend_from_slice(&self.struct_data);
        data.extend_from_slice(&self.strings_data);
        data.resize(totalsize as usize, 0);

        data
    }
}

/// A blob with the nodes the end-to-end tests expect: `chosen` with boot
/// arguments, a two-CPU `cpus` hierarchy with a `cpu-map`, and a `soc`
/// carrying two `ns16550a` UARTs and an interrupt controller referenced
/// by phandle.
pub fn sample() -> Vec<u8> {
    let mut b = DtbBuilder::new();

    b.begin_node("");
    b.prop_str("model", "dtb-tree test machine");
    b.prop_str("compatible", "test,virt");
    b.prop_u32("#address-cells", 2);
    b.prop_u32("#size-cells", 2);
    b.nop();

    b.begin_node("chosen");
    b.prop_str("bootargs", "console=ttyS0 root=/dev/vda rw");
    b.prop_str("stdout-path", "/soc/serial@10000000");
    b.end_node();

    b.begin_node("memory@80000000");
    b.prop_str("device_type", "memory");
    b.prop_cells("reg", &[0x0, 0x8000_0000, 0x0, 0x4000_0000]);
    b.end_node();

    b.begin_node("cpus");
    b.prop_u32("#address-cells", 1);
    b.prop_u32("#size-cells", 0);

    b.begin_node("cpu@0");
    b.prop_str("device_type", "cpu");
    b.prop_str("compatible", "riscv");
    b.prop_cells("reg", &[0x0]);
    b.prop_u32("phandle", 1);
    b.end_node();

    b.begin_node("cpu@1");
    b.prop_str("device_type", "cpu");
    b.prop_str("compatible", "riscv");
    b.prop_cells("reg", &[0x1]);
    b.prop_u32("phandle", 2);
    b.end_node();

    b.begin_node("cpu-map");
    b.begin_node("cluster0");
    b.begin_node("core0");
    b.prop_u32("cpu", 1);
    b.end_node();
    b.begin_node("core1");
    b.prop_u32("cpu", 2);
    b.end_node();
    b.end_node(); // cluster0
    b.end_node(); // cpu-map

    b.end_node(); // cpus

    b.begin_node("soc");
    b.prop_str("compatible", "simple-bus");
    b.prop_u32("#address-cells", 2);
    b.prop_u32("#size-cells", 2);
    b.prop_empty("ranges");

    b.begin_node("serial@10000000");
    b.prop_str("compatible", "ns16550a");
    b.prop_cells("reg", &[0x0, 0x1000_0000, 0x0, 0x100]);
    b.prop_u32("interrupt-parent", 3);
    b.end_node();

    b.begin_node("serial@10001000");
    b.prop_str_list("compatible", &["snps,dw-apb-uart", "ns16550a"]);
    b.prop_cells("reg", &[0x0, 0x1000_1000, 0x0, 0x100]);
    b.end_node();

    b.begin_node("intc@c000000");
    b.prop_str("compatible", "riscv,plic0");
    b.prop_empty("interrupt-controller");
    b.prop_u32("linux,phandle", 3);
    b.end_node();

    b.end_node(); // soc

    b.end_node(); // root

    b.finish()
}

/// Number of nodes [`sample`] encodes, root included.
pub const SAMPLE_NODE_COUNT: usize = 14;
