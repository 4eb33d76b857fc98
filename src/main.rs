//! The `syslift` driver program: parse a PE driver image, then print its
//! disassembly, its lifted IR, or the extracted Forth module.
//!
//! All diagnostics go to stderr; only translated output goes to stdout
//! (or to the `-o` file).

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use log::info;

use syslift::classify;
use syslift::decode;
use syslift::error;
use syslift::forth;
use syslift::pe::PE;
use syslift::uir;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    /// One line per decoded instruction
    Disasm,
    /// Basic blocks of the lifted entry function
    Uir,
    /// The extracted Forth driver module
    Forth,
}

/// Extract the hardware-facing half of a Windows kernel driver into a
/// portable Forth driver module.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the input PE image (.sys driver)
    input: PathBuf,

    /// Output kind
    #[arg(short = 't', long = "target", value_enum, default_value = "forth")]
    target: Target,

    /// Write output here instead of stdout
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Verbose progress on stderr (repeat for debug detail)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the section table before translating
    #[arg(short = 's', long = "sections")]
    sections: bool,

    /// Print resolved imports before translating
    #[arg(short = 'i', long = "imports")]
    imports: bool,

    /// Print resolved exports before translating
    #[arg(short = 'e', long = "exports")]
    exports: bool,
}

fn main() {
    // usage errors exit 1, help and version exit 0
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };
    let _ = stderrlog::new()
        .verbosity(args.verbose as usize + 1)
        .init();
    if let Err(err) = run(&args) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn run(args: &Args) -> error::Result<()> {
    let bytes = fs::read(&args.input)?;
    let image = PE::parse(&bytes)?;
    info!(
        "parsed {}: {} sections, {} imports, {} exports",
        args.input.display(),
        image.sections.len(),
        image.imports.len(),
        image.exports.len()
    );

    if args.sections {
        print_sections(&image);
    }
    if args.imports {
        print_imports(&image);
    }
    if args.exports {
        print_exports(&image);
    }

    let text = image.text.ok_or_else(|| {
        error::Error::Malformed("image has no executable section".to_string())
    })?;
    let base = image.image_base as u32;
    let text_va = base.wrapping_add(text.rva);
    let entry_va = base.wrapping_add(image.entry);

    let output = match args.target {
        Target::Disasm => {
            let insts = decode::decode_range(text.bytes, text_va)?;
            info!("decoded {} instructions", insts.len());
            let mut out = String::new();
            for inst in &insts {
                out.push_str(&decode::fmt::line(inst));
                out.push('\n');
            }
            out
        }
        Target::Uir => {
            let insts = decode_from(text.bytes, text_va, entry_va)?;
            let function = uir::lift(&insts, entry_va);
            info!("lifted {} basic blocks", function.blocks.len());
            function.dump()
        }
        Target::Forth => extract(args, &image, text.bytes, text_va, entry_va)?,
    };

    match &args.output {
        Some(path) => fs::write(path, output)?,
        None => print!("{}", output),
    }
    Ok(())
}

/// Decode from `start_va` to the end of the section.
fn decode_from(bytes: &[u8], text_va: u32, start_va: u32) -> error::Result<Vec<decode::Inst>> {
    let offset = start_va.wrapping_sub(text_va) as usize;
    if offset >= bytes.len() {
        return Err(error::Error::Malformed(format!(
            "function start {:#x} lies outside the code section",
            start_va
        )));
    }
    decode::decode_range(&bytes[offset..], start_va)
}

/// Run the tail of the pipeline: lift every discovered function, classify,
/// and emit the module.
fn extract(
    args: &Args,
    image: &PE<'_>,
    text: &[u8],
    text_va: u32,
    entry_va: u32,
) -> error::Result<String> {
    // Function discovery: the driver entry plus every export that lands
    // in the code section. The entry keeps a fixed name; exports keep
    // theirs; duplicates lift once.
    let base = image.image_base as u32;
    let mut starts: Vec<(String, u32)> = vec![("DRIVER-ENTRY".to_string(), entry_va)];
    for export in &image.exports {
        let va = base.wrapping_add(export.rva);
        if va < text_va || va >= text_va.wrapping_add(text.len() as u32) {
            continue;
        }
        if starts.iter().any(|(_, existing)| *existing == va) {
            continue;
        }
        let name = match export.name {
            Some(name) => forth::vocab_name(name),
            None => format!("FUNC-{:X}", va),
        };
        starts.push((name, va));
    }

    let mut functions: Vec<(String, uir::Function)> = Vec::new();
    for (name, va) in starts {
        let insts = decode_from(text, text_va, va)?;
        let function = uir::lift(&insts, va);
        info!(
            "lifted {} @ {:#x}: {} blocks, port i/o: {}",
            name,
            va,
            function.blocks.len(),
            function.has_port_io
        );
        functions.push((name, function));
    }

    let imports = classify::classify_imports(&image.imports);
    let classification = classify::analyze_functions(&functions, &imports);
    info!(
        "classified {} functions: {} hardware, {} filtered",
        classification.functions.len(),
        classification.hardware_count,
        classification.filtered_count
    );

    let stem = args
        .input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("driver");
    let file_name = args
        .input
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string);
    let module = forth::build_module(
        &forth::vocab_name(stem),
        file_name.as_deref(),
        &classification,
        &functions,
    );
    Ok(forth::emit(&module))
}

fn print_sections(image: &PE<'_>) {
    eprintln!("sections:");
    for section in &image.sections {
        eprintln!(
            "  {:8} va {:#010x} vsize {:#010x} raw {:#010x} rawsize {:#010x} flags {:#010x}",
            section.name(),
            section.virtual_address,
            section.virtual_size,
            section.pointer_to_raw_data,
            section.size_of_raw_data,
            section.characteristics
        );
    }
}

fn print_imports(image: &PE<'_>) {
    eprintln!("imports:");
    for import in &image.imports {
        eprintln!(
            "  {:#010x} {} <- {}",
            import.iat_rva, import.name, import.dll
        );
    }
}

fn print_exports(image: &PE<'_>) {
    eprintln!("exports:");
    for export in &image.exports {
        eprintln!(
            "  {:#010x} ord {} {}",
            export.rva,
            export.ordinal,
            export.name.unwrap_or("<unnamed>")
        );
    }
}
