//! Renders classified driver functions as a textual Forth module.
//!
//! The output is plain ASCII, line-oriented, and opens with a metadata
//! header of `\ KEY: value` comment lines that line-oriented tools can
//! consume without an XML or JSON parser.

use core::fmt::{self, Write as _};

use crate::classify;
use crate::uir;

/// How the module came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Extracted,
    HandWritten,
    Hybrid,
}

impl SourceType {
    pub fn name(self) -> &'static str {
        match self {
            SourceType::Extracted => "extracted",
            SourceType::HandWritten => "hand-written",
            SourceType::Hybrid => "hybrid",
        }
    }
}

/// How much the extraction is to be trusted. `High` is reserved for
/// hand-written modules; extraction yields `Medium`, degraded to `Low`
/// when any port was addressed dynamically through DX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn name(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// Direction of one port access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDir {
    In,
    Out,
}

/// One port access observed in a function body, in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortOp {
    pub port: u16,
    /// Access width in bytes (1, 2, or 4)
    pub width: u8,
    pub dir: PortDir,
}

impl PortOp {
    /// The width- and direction-specific port word this access maps to.
    pub fn word(self) -> &'static str {
        match (self.dir, self.width) {
            (PortDir::In, 1) => "C@-PORT",
            (PortDir::In, 2) => "W@-PORT",
            (PortDir::In, _) => "@-PORT",
            (PortDir::Out, 1) => "C!-PORT",
            (PortDir::Out, 2) => "W!-PORT",
            (PortDir::Out, _) => "!-PORT",
        }
    }
}

/// One function to emit as a colon definition.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: String,
    /// Original machine address, kept for traceability comments
    pub addr: u32,
    pub ops: Vec<PortOp>,
    /// All accesses are writes: looks like device initialization
    pub init: bool,
    /// Contains a conditional back-edge and a port read: looks like a
    /// status-polling loop
    pub polling: bool,
}

/// A required vocabulary and the specific words used from it.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub vocabulary: String,
    pub words: Vec<String>,
}

/// Declarative input for one emitted driver module.
#[derive(Debug, Clone)]
pub struct Module {
    /// Vocabulary name, also the CATALOG header value
    pub name: String,
    pub category: String,
    pub source: SourceType,
    pub source_binary: Option<String>,
    pub vendor_id: Option<String>,
    pub device_id: Option<String>,
    /// Human-readable port-range description, e.g. `0x60-0x64`
    pub ports: Option<String>,
    pub mmio: Option<String>,
    pub requires: Vec<Dependency>,
    pub confidence: Confidence,
    pub functions: Vec<FunctionSpec>,
    /// Unique port offsets, sorted; one `REG-XX` constant each
    pub port_offsets: Vec<u16>,
}

/// Format a port-range description: `0xXXX-0xYYY`, or `0xXXX` for a
/// single port.
pub fn port_range(base: u16, count: u16) -> String {
    if count <= 1 {
        format!("{:#X}", base)
    } else {
        format!("{:#X}-{:#X}", base, base + (count - 1))
    }
}

fn opt(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("none")
}

fn reg_name(port: u16) -> String {
    format!("REG-{:02X}", port)
}

/// The body phrase for one port access, built on the module's accessors.
fn op_phrase(op: PortOp) -> String {
    match (op.dir, op.width) {
        (PortDir::In, 1) => format!("{} REG@", reg_name(op.port)),
        (PortDir::Out, 1) => format!("{} REG!", reg_name(op.port)),
        _ => format!("{} >PORT {}", reg_name(op.port), op.word()),
    }
}

/// Net stack effect of a sequence of port accesses: each read pushes one
/// cell, each write pops one.
fn stack_comment(ops: &[PortOp]) -> String {
    let mut depth: i32 = 0;
    let mut min: i32 = 0;
    for op in ops {
        match op.dir {
            PortDir::In => depth += 1,
            PortDir::Out => depth -= 1,
        }
        if depth < min {
            min = depth;
        }
    }
    let inputs = (-min) as usize;
    let outputs = (depth - min) as usize;
    let mut comment = String::from("(");
    for _ in 0..inputs {
        comment.push_str(" x");
    }
    comment.push_str(" --");
    for _ in 0..outputs {
        comment.push_str(" x");
    }
    comment.push_str(" )");
    comment
}

fn render(out: &mut String, module: &Module) -> fmt::Result {
    // metadata header
    writeln!(out, "\\ CATALOG: {}", module.name)?;
    writeln!(out, "\\ CATEGORY: {}", module.category)?;
    writeln!(out, "\\ SOURCE: {}", module.source.name())?;
    writeln!(out, "\\ SOURCE-BINARY: {}", opt(&module.source_binary))?;
    writeln!(out, "\\ VENDOR-ID: {}", opt(&module.vendor_id))?;
    writeln!(out, "\\ DEVICE-ID: {}", opt(&module.device_id))?;
    writeln!(out, "\\ PORTS: {}", opt(&module.ports))?;
    writeln!(out, "\\ MMIO: {}", opt(&module.mmio))?;
    writeln!(out, "\\ CONFIDENCE: {}", module.confidence.name())?;
    for dep in &module.requires {
        writeln!(out, "\\ REQUIRES: {} ({})", dep.vocabulary, dep.words.join(" "))?;
    }
    writeln!(out)?;

    // vocabulary preamble
    writeln!(out, "VOCABULARY {}", module.name)?;
    writeln!(out, "{} DEFINITIONS", module.name)?;
    writeln!(out, "HEX")?;
    writeln!(out)?;

    if !module.port_offsets.is_empty() {
        // register constants
        for port in &module.port_offsets {
            writeln!(out, "{:X} CONSTANT {}", port, reg_name(*port))?;
        }
        writeln!(out)?;

        // base accessors
        writeln!(out, "VARIABLE IO-BASE")?;
        writeln!(out, ": >PORT ( offset -- port ) IO-BASE @ + ;")?;
        writeln!(out, ": REG@ ( offset -- byte ) >PORT C@-PORT ;")?;
        writeln!(out, ": REG! ( byte offset -- ) >PORT C!-PORT ;")?;
        writeln!(out)?;
    }

    // function bodies
    for function in &module.functions {
        if function.init {
            writeln!(out, "\\ init pattern")?;
        }
        if function.polling {
            writeln!(out, "\\ polling pattern")?;
        }
        match function.ops.len() {
            0 => {
                writeln!(
                    out,
                    ": {} ( -- ) ; \\ no hardware access at {:#x}",
                    function.name, function.addr
                )?;
            }
            1 => {
                writeln!(
                    out,
                    ": {} {} {} ;",
                    function.name,
                    stack_comment(&function.ops),
                    op_phrase(function.ops[0])
                )?;
            }
            _ => {
                writeln!(out, ": {} {}", function.name, stack_comment(&function.ops))?;
                for op in &function.ops {
                    writeln!(out, "  {}", op_phrase(*op))?;
                }
                writeln!(out, ";")?;
            }
        }
        writeln!(out)?;
    }

    // footer
    writeln!(out, "FORTH DEFINITIONS")?;
    writeln!(out, "DECIMAL")?;
    Ok(())
}

/// Render the module. Infallible for well-formed input: the only writer
/// is an in-memory string.
pub fn emit(module: &Module) -> String {
    let mut out = String::new();
    let _ = render(&mut out, module);
    out
}

/// Collect a function's port accesses in program order. DX-relative
/// accesses have no static port and contribute nothing here; they are
/// accounted for through the function's dynamic-port flag.
fn collect_ops(function: &uir::Function) -> Vec<PortOp> {
    let mut ops = Vec::new();
    for block in &function.blocks {
        for inst in &block.insts {
            match inst.op {
                uir::Op::PortIn => {
                    if let Some(uir::Operand::Imm(port)) = inst.src1 {
                        ops.push(PortOp {
                            port: port as u16,
                            width: inst.width,
                            dir: PortDir::In,
                        });
                    }
                }
                uir::Op::PortOut => {
                    if let Some(uir::Operand::Imm(port)) = inst.dst {
                        ops.push(PortOp {
                            port: port as u16,
                            width: inst.width,
                            dir: PortDir::Out,
                        });
                    }
                }
                _ => {}
            }
        }
    }
    ops
}

/// A conditional branch whose target does not lie ahead of it.
fn has_back_edge(function: &uir::Function) -> bool {
    function.blocks.iter().enumerate().any(|(i, block)| {
        block
            .branch
            .map_or(false, |target| function.blocks[target].start <= block.start && i >= target)
    })
}

/// Assemble the emitter input from the classifier verdicts and the lifted
/// functions they describe. The two slices are parallel.
pub fn build_module(
    vocab: &str,
    source_binary: Option<&str>,
    classification: &classify::Classification,
    functions: &[(String, uir::Function)],
) -> Module {
    let mut specs = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut all_ports: Vec<u16> = Vec::new();
    let mut dynamic = false;

    for (class, (_, function)) in classification.functions.iter().zip(functions.iter()) {
        let ops = collect_ops(function);
        let init = !ops.is_empty() && ops.iter().all(|op| op.dir == PortDir::Out);
        let polling = has_back_edge(function) && ops.iter().any(|op| op.dir == PortDir::In);
        for op in &ops {
            let word = op.word().to_string();
            if !words.contains(&word) {
                words.push(word);
            }
            all_ports.push(op.port);
        }
        dynamic |= function.dynamic_port;
        specs.push(FunctionSpec {
            name: class.name.clone(),
            addr: class.entry,
            ops,
            init,
            polling,
        });
    }

    all_ports.sort_unstable();
    all_ports.dedup();

    // the byte accessors are always declared alongside the constants
    if !all_ports.is_empty() {
        for word in ["C@-PORT", "C!-PORT"] {
            if !words.iter().any(|w| w == word) {
                words.push(word.to_string());
            }
        }
        words.sort_unstable();
    }

    let ports = if all_ports.is_empty() {
        None
    } else {
        let base = all_ports[0];
        let last = all_ports[all_ports.len() - 1];
        Some(port_range(base, last - base + 1))
    };

    let category = if classification.hardware_count > 0 {
        classify::Category::PortIo.name()
    } else {
        classify::Category::Unknown.name()
    };

    Module {
        name: vocab.to_string(),
        category: category.to_string(),
        source: SourceType::Extracted,
        source_binary: source_binary.map(str::to_string),
        vendor_id: None,
        device_id: None,
        ports,
        mmio: None,
        requires: vec![Dependency {
            vocabulary: "HARDWARE".to_string(),
            words,
        }],
        confidence: if dynamic {
            Confidence::Low
        } else {
            Confidence::Medium
        },
        functions: specs,
        port_offsets: all_ports,
    }
}

/// Derive a vocabulary name from a file stem: uppercased, with anything
/// outside `[A-Za-z0-9]` collapsed to `-`.
pub fn vocab_name(stem: &str) -> String {
    let mut name: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '-'
            }
        })
        .collect();
    if name.is_empty() {
        name.push_str("DRIVER");
    }
    name
}
