//! Build-time codegen (spec §6, §1 ambient stack, §9):
//!
//! - generates one interrupt trampoline per IDT vector (0..256) and a
//!   `TRAMPOLINE_TABLE` of their addresses, assembling them with the
//!   hand-written common tail via the `cc` crate;
//! - generates the syscall dispatch table from `syscalls.defs`;
//! - generates `pub const` config values from the flat `config` file.
//!
//! Shells out to an external assembler (the `cc` crate) the same way for
//! both hand-written and generated `.asm` entry stubs — the file being
//! assembled is still plain `.asm` text an assembler can read either way.

use std::collections::HashSet;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

/// IDT vectors where the CPU itself pushes a 32-bit error code before
/// invoking the handler. Every other vector needs a dummy pushed so the
/// common tail's stack layout is uniform.
const VECTORS_WITH_ERROR_CODE: &[u8] = &[8, 10, 11, 12, 13, 14, 17, 30];

const VECTOR_COUNT: usize = 256;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    generate_trampolines(&out_dir);
    generate_syscall_table();
    generate_config();

    println!("cargo:rerun-if-changed=src/arch/x86/asm/interrupt_tail.asm");
    println!("cargo:rerun-if-changed=src/arch/x86/asm/useraccess.asm");
    println!("cargo:rerun-if-changed=syscalls.defs");
    println!("cargo:rerun-if-changed=config");
    println!("cargo:rerun-if-changed=build.rs");
}

fn generate_trampolines(out_dir: &PathBuf) {
    let has_err_code: HashSet<u8> = VECTORS_WITH_ERROR_CODE.iter().copied().collect();

    let mut asm = String::new();
    asm.push_str("[BITS 32]\nsection .text\nextern common_interrupt_tail\n");
    for v in 0..VECTOR_COUNT {
        writeln!(asm, "global trampoline_{v}").unwrap();
    }
    asm.push('\n');

    for v in 0..VECTOR_COUNT {
        writeln!(asm, "trampoline_{v}:").unwrap();
        if !has_err_code.contains(&(v as u8)) {
            asm.push_str("    push dword 0\n");
        }
        writeln!(asm, "    push dword {v}").unwrap();
        asm.push_str("    jmp common_interrupt_tail\n");
    }

    asm.push_str("\nsection .rodata\nglobal TRAMPOLINE_TABLE\nalign 4\nTRAMPOLINE_TABLE:\n");
    for v in 0..VECTOR_COUNT {
        writeln!(asm, "    dd trampoline_{v}").unwrap();
    }

    let generated_path = out_dir.join("trampolines_generated.asm");
    fs::write(&generated_path, asm).expect("failed to write generated trampoline asm");

    cc::Build::new()
        .file(&generated_path)
        .file("src/arch/x86/asm/interrupt_tail.asm")
        .file("src/arch/x86/asm/useraccess.asm")
        .compile("trampolines");
}

struct SyscallEntry {
    number: u32,
    name: String,
    handler: String,
}

fn parse_defs(contents: &str) -> Vec<SyscallEntry> {
    let mut entries = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let number: u32 = parts
            .next()
            .expect("syscalls.defs line missing number")
            .parse()
            .expect("syscalls.defs number must be a u32");
        let name = parts
            .next()
            .expect("syscalls.defs line missing name")
            .to_string();
        let handler = parts
            .next()
            .expect("syscalls.defs line missing handler path")
            .to_string();
        entries.push(SyscallEntry {
            number,
            name,
            handler,
        });
    }
    entries
}

fn generate_syscall_table() {
    let contents = fs::read_to_string("syscalls.defs").expect("missing syscalls.defs");
    let entries = parse_defs(&contents);
    let max = entries.iter().map(|e| e.number).max().unwrap_or(0) as usize;
    let table_len = max + 1;

    let mut slots: Vec<Option<&SyscallEntry>> = vec![None; table_len];
    for entry in &entries {
        slots[entry.number as usize] = Some(entry);
    }

    let mut out = String::new();
    writeln!(out, "pub const SYSCALL_TABLE_LEN: usize = {table_len};").unwrap();
    writeln!(
        out,
        "pub static SYSCALL_TABLE: [Option<SyscallHandler>; {table_len}] = ["
    )
    .unwrap();
    for (number, slot) in slots.iter().enumerate() {
        match slot {
            Some(entry) => {
                writeln!(out, "    Some({}), // {} ({})", entry.handler, entry.name, number)
                    .unwrap();
            }
            None => writeln!(out, "    None, // {number}").unwrap(),
        }
    }
    out.push_str("];\n\n");

    writeln!(out, "pub fn name_for(number: usize) -> Option<&'static str> {{").unwrap();
    out.push_str("    match number {\n");
    for entry in &entries {
        writeln!(out, "        {} => Some(\"{}\"),", entry.number, entry.name).unwrap();
    }
    out.push_str("        _ => None,\n    }\n}\n");

    let out_dir = env::var("OUT_DIR").unwrap();
    fs::write(format!("{out_dir}/syscall_table_generated.rs"), out)
        .expect("failed to write generated syscall table");
}

fn generate_config() {
    let contents = fs::read_to_string("config").expect("missing config file");
    let mut out = String::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .unwrap_or_else(|| panic!("config line `{line}` missing `=`"));
        let value: u64 = value
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("config value for `{key}` must be a u64"));
        writeln!(out, "pub const {}: u64 = {};", key.trim(), value).unwrap();
    }

    let out_dir = env::var("OUT_DIR").unwrap();
    fs::write(format!("{out_dir}/config_generated.rs"), out)
        .expect("failed to write generated config constants");
}
