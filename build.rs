use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

// Vectors for which the CPU pushes an error code itself.
const HAS_ERROR_CODE: [u32; 7] = [8, 10, 11, 12, 13, 14, 17];

fn vectors_asm() -> String {
    let mut out = String::from(".text\n.globl __alltraps\n");
    for i in 0..256u32 {
        let _ = writeln!(out, ".globl vector{i}\nvector{i}:");
        if !HAS_ERROR_CODE.contains(&i) {
            out.push_str("    pushl $0\n");
        }
        let _ = writeln!(out, "    pushl ${i}\n    jmp __alltraps");
    }
    out.push_str("\n.data\n.globl __vectors\n.balign 4\n__vectors:\n");
    for i in 0..256u32 {
        let _ = writeln!(out, "    .long vector{i}");
    }
    out
}

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::write(out_dir.join("vectors.S"), vectors_asm()).expect("failed to write vectors.S");

    if env::var_os("CARGO_FEATURE_KERNEL").is_some() {
        let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
        println!("cargo:rustc-link-arg-bins=-T{}", manifest.join("kernel.ld").display());
    }
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=kernel.ld");
}
