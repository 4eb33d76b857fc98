//! Semantic classification: which imports and which functions talk to
//! hardware, and which exist only to satisfy the host kernel.

pub mod catalog;

use log::debug;

use crate::pe;
use crate::uir;

/// Semantic category of an imported kernel API or a driver function.
///
/// The first six values form the hardware band; the next eight form the
/// scaffolding band. Hardware survives extraction, scaffolding does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    PortIo,
    Mmio,
    Dma,
    Interrupt,
    Timing,
    PciConfig,
    Irp,
    Pnp,
    Power,
    MemoryManager,
    Synchronization,
    Registry,
    String,
    Wmi,
    Unknown,
}

impl Category {
    pub fn is_hardware(self) -> bool {
        use Category::*;
        matches!(self, PortIo | Mmio | Dma | Interrupt | Timing | PciConfig)
    }

    pub fn is_scaffolding(self) -> bool {
        use Category::*;
        matches!(
            self,
            Irp | Pnp | Power | MemoryManager | Synchronization | Registry | String | Wmi
        )
    }

    pub fn name(self) -> &'static str {
        use Category::*;
        match self {
            PortIo => "port-io",
            Mmio => "mmio",
            Dma => "dma",
            Interrupt => "interrupt",
            Timing => "timing",
            PciConfig => "pci-config",
            Irp => "irp",
            Pnp => "pnp",
            Power => "power",
            MemoryManager => "memory-manager",
            Synchronization => "synchronization",
            Registry => "registry",
            String => "string",
            Wmi => "wmi",
            Unknown => "unknown",
        }
    }
}

/// An import tagged against the API recognition catalogue. Retains the
/// IAT slot RVA so indirect-call targets can be matched back to it.
#[derive(Debug, Clone)]
pub struct ClassifiedImport {
    pub name: String,
    pub dll: String,
    pub iat_rva: u32,
    pub category: Category,
    /// The equivalent Forth word, for hardware-band imports
    pub word: Option<&'static str>,
}

/// Tag each import with its catalogue category. Unrecognized names are
/// tagged [`Category::Unknown`], never rejected.
pub fn classify_imports(imports: &[pe::Import<'_>]) -> Vec<ClassifiedImport> {
    imports
        .iter()
        .map(|import| {
            let (category, word) = match catalog::lookup(&import.name) {
                Some(entry) => (entry.category, entry.word),
                None => {
                    debug!("unrecognized import {} from {}", import.name, import.dll);
                    (Category::Unknown, None)
                }
            };
            ClassifiedImport {
                name: import.name.to_string(),
                dll: import.dll.to_string(),
                iat_rva: import.iat_rva,
                category,
                word,
            }
        })
        .collect()
}

/// Classification verdict for one lifted function.
#[derive(Debug, Clone)]
pub struct FunctionClass {
    pub entry: u32,
    /// Display name: an export name, or synthesized from the address
    pub name: String,
    pub category: Category,
    pub has_port_io: bool,
    pub has_mmio: bool,
    pub has_timing: bool,
    pub has_pci: bool,
    pub has_scaffolding: bool,
    pub hardware_calls: u32,
    pub scaffolding_calls: u32,
    /// Whether the function is worth carrying into the emitted module
    pub hardware_relevant: bool,
    /// Ports touched, read and written merged, sorted and deduplicated
    pub ports: Vec<u16>,
}

/// The classifier's combined result.
#[derive(Debug, Clone)]
pub struct Classification {
    pub imports: Vec<ClassifiedImport>,
    pub functions: Vec<FunctionClass>,
    pub hardware_count: usize,
    pub filtered_count: usize,
}

/// Classify each lifted function from its port-I/O evidence.
///
/// Evidence is direct port instructions only: matching indirect CALLs
/// through the IAT against the classified imports would also catch
/// `READ_PORT_UCHAR`-style wrappers, but that refinement is not
/// implemented; the IAT RVAs are retained for it.
pub fn analyze_functions(
    functions: &[(String, uir::Function)],
    imports: &[ClassifiedImport],
) -> Classification {
    let mut classified = Vec::with_capacity(functions.len());
    let mut hardware_count = 0;
    for (name, function) in functions {
        let has_port_io = function.has_port_io;
        let mut ports: Vec<u16> = function
            .ports_read
            .iter()
            .chain(function.ports_written.iter())
            .copied()
            .collect();
        ports.sort_unstable();
        ports.dedup();
        let category = if has_port_io {
            Category::PortIo
        } else {
            Category::Unknown
        };
        if has_port_io {
            hardware_count += 1;
        }
        debug!(
            "function {} @ {:#x}: {} ({} ports)",
            name,
            function.entry,
            category.name(),
            ports.len()
        );
        classified.push(FunctionClass {
            entry: function.entry,
            name: name.clone(),
            category,
            has_port_io,
            has_mmio: false,
            has_timing: false,
            has_pci: false,
            has_scaffolding: false,
            hardware_calls: 0,
            scaffolding_calls: 0,
            hardware_relevant: has_port_io,
            ports,
        });
    }
    let filtered_count = classified.len() - hardware_count;
    Classification {
        imports: imports.to_vec(),
        functions: classified,
        hardware_count,
        filtered_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_range;
    use crate::uir;
    use std::borrow::Cow;

    fn import(name: &'static str) -> pe::Import<'static> {
        pe::Import {
            name: Cow::Borrowed(name),
            dll: "ntoskrnl.exe",
            ordinal: 0,
            iat_rva: 0x2000,
        }
    }

    #[test]
    fn classifies_known_imports() {
        let imports = [
            import("READ_PORT_UCHAR"),
            import("IoCompleteRequest"),
            import("KeStallExecutionProcessor"),
            import("HalGetBusData"),
        ];
        let classified = classify_imports(&imports);
        assert_eq!(classified[0].category, Category::PortIo);
        assert_eq!(classified[0].word, Some("C@-PORT"));
        assert_eq!(classified[1].category, Category::Irp);
        assert_eq!(classified[1].word, None);
        assert_eq!(classified[2].category, Category::Timing);
        assert_eq!(classified[2].word, Some("US-DELAY"));
        assert_eq!(classified[3].category, Category::PciConfig);
        assert_eq!(classified[3].word, Some("PCI-READ"));
    }

    #[test]
    fn unknown_imports_degrade_without_error() {
        let classified = classify_imports(&[import("DbgPrint")]);
        assert_eq!(classified[0].category, Category::Unknown);
        assert_eq!(classified[0].word, None);
        assert_eq!(classified[0].iat_rva, 0x2000);
    }

    #[test]
    fn classification_is_deterministic() {
        let imports = [import("READ_PORT_UCHAR"), import("DbgPrint")];
        let first = classify_imports(&imports);
        let second = classify_imports(&imports);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.category, b.category);
            assert_eq!(a.word, b.word);
        }
    }

    #[test]
    fn band_predicates_partition_the_categories() {
        assert!(Category::PortIo.is_hardware());
        assert!(Category::Mmio.is_hardware());
        assert!(Category::Irp.is_scaffolding());
        assert!(Category::Power.is_scaffolding());
        assert!(!Category::Unknown.is_hardware());
        assert!(!Category::Unknown.is_scaffolding());
    }

    fn lift_bytes(bytes: &[u8], base: u32) -> uir::Function {
        let insts = decode_range(bytes, base).unwrap();
        uir::lift(&insts, base)
    }

    #[test]
    fn port_io_makes_a_function_hardware_relevant() {
        let with_ports = lift_bytes(&[0xe4, 0x60, 0xe6, 0x61, 0xc3], 0x1000);
        let without = lift_bytes(&[0x90, 0xc3], 0x2000);
        let functions = vec![
            ("keyboard_read".to_string(), with_ports),
            ("helper".to_string(), without),
        ];
        let result = analyze_functions(&functions, &[]);
        assert_eq!(result.hardware_count, 1);
        assert_eq!(result.filtered_count, 1);
        assert_eq!(result.functions[0].category, Category::PortIo);
        assert!(result.functions[0].hardware_relevant);
        assert_eq!(result.functions[0].ports, [0x60, 0x61]);
        assert_eq!(result.functions[1].category, Category::Unknown);
        assert!(!result.functions[1].hardware_relevant);
    }
}
