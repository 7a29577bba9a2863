//! In-memory ELF64 symbol files.
//!
//! The object carries no code bytes. `.text` and `.rodata` are `NOBITS`
//! sections placed at the block's real addresses, so a debugger only learns
//! names and extents from `.symtab`.

/// What a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A chain step in `.text`.
    Function,
    /// An interned literal in `.rodata`.
    Object,
}

/// One named address range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSymbol {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub kind: SymbolKind,
}

/// Section bounds and symbols of one compiled block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugImage {
    pub code_address: u64,
    pub code_size: u64,
    pub data_address: u64,
    pub data_size: u64,
    pub symbols: Vec<DebugSymbol>,
}

// ---------------------------------------------------------------------------
// ELF constants
// ---------------------------------------------------------------------------

const EHDR_SIZE: usize = 64;
const SHDR_SIZE: usize = 64;
const SYM_SIZE: usize = 24;

const ET_REL: u16 = 1;
const EM_X86_64: u16 = 62;

const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_NOBITS: u32 = 8;

const SHF_ALLOC: u64 = 0x2;
const SHF_EXECINSTR: u64 = 0x4;

const STB_GLOBAL: u8 = 1;
const STT_OBJECT: u8 = 1;
const STT_FUNC: u8 = 2;

const TEXT_INDEX: u16 = 1;
const RODATA_INDEX: u16 = 2;
const STRTAB_INDEX: u32 = 4;
const SHSTRTAB_INDEX: u16 = 5;
const SECTION_COUNT: u16 = 6;

// ---------------------------------------------------------------------------
// Byte writer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn align(&mut self, to: usize) {
        while self.bytes.len() % to != 0 {
            self.bytes.push(0);
        }
    }
}

/// NUL-separated name table; offset 0 is the empty name.
struct StringTable {
    bytes: Vec<u8>,
}

impl StringTable {
    fn new() -> Self {
        Self { bytes: vec![0] }
    }

    fn add(&mut self, name: &str) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        offset
    }
}

struct SectionHeader {
    name: u32,
    kind: u32,
    flags: u64,
    address: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    align: u64,
    entsize: u64,
}

impl SectionHeader {
    fn null() -> Self {
        Self {
            name: 0,
            kind: 0,
            flags: 0,
            address: 0,
            offset: 0,
            size: 0,
            link: 0,
            info: 0,
            align: 0,
            entsize: 0,
        }
    }

    fn write(&self, out: &mut Writer) {
        out.u32(self.name);
        out.u32(self.kind);
        out.u64(self.flags);
        out.u64(self.address);
        out.u64(self.offset);
        out.u64(self.size);
        out.u32(self.link);
        out.u32(self.info);
        out.u64(self.align);
        out.u64(self.entsize);
    }
}

/// Serializes `image` as an ELF64 relocatable object.
pub fn build_object(image: &DebugImage) -> Vec<u8> {
    let mut shstrtab = StringTable::new();
    let text_name = shstrtab.add(".text");
    let rodata_name = shstrtab.add(".rodata");
    let symtab_name = shstrtab.add(".symtab");
    let strtab_name = shstrtab.add(".strtab");
    let shstrtab_name = shstrtab.add(".shstrtab");

    let mut strtab = StringTable::new();
    let mut symtab = Writer::default();
    symtab.bytes.resize(SYM_SIZE, 0);
    for symbol in &image.symbols {
        let (kind, section) = match symbol.kind {
            SymbolKind::Function => (STT_FUNC, TEXT_INDEX),
            SymbolKind::Object => (STT_OBJECT, RODATA_INDEX),
        };
        symtab.u32(strtab.add(&symbol.name));
        symtab.u8((STB_GLOBAL << 4) | kind);
        symtab.u8(0);
        symtab.u16(section);
        symtab.u64(symbol.address);
        symtab.u64(symbol.size);
    }

    let mut out = Writer::default();
    out.bytes.resize(EHDR_SIZE, 0);
    let symtab_offset = out.bytes.len();
    out.bytes.extend_from_slice(&symtab.bytes);
    let strtab_offset = out.bytes.len();
    out.bytes.extend_from_slice(&strtab.bytes);
    let shstrtab_offset = out.bytes.len();
    out.bytes.extend_from_slice(&shstrtab.bytes);
    out.align(8);
    let section_offset = out.bytes.len();

    let sections = [
        SectionHeader::null(),
        SectionHeader {
            name: text_name,
            kind: SHT_NOBITS,
            flags: SHF_ALLOC | SHF_EXECINSTR,
            address: image.code_address,
            size: image.code_size,
            align: 16,
            ..SectionHeader::null()
        },
        SectionHeader {
            name: rodata_name,
            kind: SHT_NOBITS,
            flags: SHF_ALLOC,
            address: image.data_address,
            size: image.data_size,
            align: 1,
            ..SectionHeader::null()
        },
        SectionHeader {
            name: symtab_name,
            kind: SHT_SYMTAB,
            offset: symtab_offset as u64,
            size: symtab.bytes.len() as u64,
            link: STRTAB_INDEX,
            info: 1,
            align: 8,
            entsize: SYM_SIZE as u64,
            ..SectionHeader::null()
        },
        SectionHeader {
            name: strtab_name,
            kind: SHT_STRTAB,
            offset: strtab_offset as u64,
            size: strtab.bytes.len() as u64,
            align: 1,
            ..SectionHeader::null()
        },
        SectionHeader {
            name: shstrtab_name,
            kind: SHT_STRTAB,
            offset: shstrtab_offset as u64,
            size: shstrtab.bytes.len() as u64,
            align: 1,
            ..SectionHeader::null()
        },
    ];
    for section in &sections {
        section.write(&mut out);
    }

    let mut header = Writer::default();
    header.bytes.extend_from_slice(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0]);
    header.bytes.resize(16, 0);
    header.u16(ET_REL);
    header.u16(EM_X86_64);
    header.u32(1);
    header.u64(0);
    header.u64(0);
    header.u64(section_offset as u64);
    header.u32(0);
    header.u16(EHDR_SIZE as u16);
    header.u16(0);
    header.u16(0);
    header.u16(SHDR_SIZE as u16);
    header.u16(SECTION_COUNT);
    header.u16(SHSTRTAB_INDEX);
    out.bytes[..EHDR_SIZE].copy_from_slice(&header.bytes);
    out.bytes
}
