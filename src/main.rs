//! # An 8086-subset Assembler and Simulator written in Rust.
//!
//! Assembles a small, regular subset of 8086 assembly, loads it into a
//! simulated real-mode machine and executes it instruction by
//! instruction with bit-exact flags. Built as the engine for an
//! interactive teaching tool, so every operation reports back exactly
//! what changed: registers, memory cells and I/O events.
//!
//! ## Getting Started
//! To assemble and run a program:
//! ```text
//! cargo run -- -r /path/to/program.asm
//! ```
//! ## Options
//! Help for command line options is available using -h or --help.
#[macro_use]
mod macros;
mod assembler;
mod config;
mod core;
mod criteria;
mod error;
mod imm;
mod instructions;
mod lexer;
mod memory;
mod operand;
mod registers;
mod runtime;
mod session;
mod symbols;

use std::io;
pub(crate) use imm::{Imm, Width};
pub(crate) use {crate::core::{Core, Interrupt, RunState}, crate::error::*};

fn main() {
    config::init();
    // process_file does all the work
    if let Err(e) = process_file(config::ARGS.file.as_str()) {
        println!("{}", e);
        std::process::exit(1);
    }
}

/// Assemble the given file, optionally list it, optionally run it and
/// evaluate its test criteria.
fn process_file(path: &str) -> Result<(), Error> {
    verbose_println!("assembling {}", path);
    let src = std::fs::read_to_string(path)?;
    let mut session = session::Session::new();
    if let Err(errors) = session.assemble(&src) {
        for e in &errors {
            println!("{}", e);
        }
        return Err(general_err!(format!("{} assembly error(s)", errors.len())));
    }
    if config::ARGS.list {
        if let Some(program) = session.program() {
            program.write_listing(&mut io::stdout())?;
        }
    }
    if !config::run() {
        return Ok(());
    }
    let mut printed = false;
    if config::ARGS.trace || config::ARGS.break_at.is_some() {
        // manual step loop so the breakpoint can be honored
        let mut steps = 0u64;
        loop {
            match session.core().state {
                RunState::Halted | RunState::Faulted => break,
                _ => {}
            }
            if let Some(addr) = config::ARGS.break_at {
                if session.core().reg.ip == addr {
                    info!("stopped at breakpoint 0x{:04x}", addr);
                    break;
                }
            }
            if steps >= config::ARGS.step_limit {
                return Err(Error::new(
                    ErrorKind::StepLimit,
                    None,
                    format!("exceeded step limit of {} instructions", config::ARGS.step_limit).as_str(),
                ));
            }
            steps += 1;
            let st = session.step()?;
            if let Some(Interrupt::Print(c)) = st.interrupt {
                print!("{}", c);
                printed = true;
            }
        }
    } else {
        match session.run() {
            Ok(r) => {
                for i in r.interrupts {
                    if let Interrupt::Print(c) = i {
                        print!("{}", c);
                        printed = true;
                    }
                }
            }
            Err(e) => {
                println!("{}", e);
                return Err(e);
            }
        }
    }
    if printed {
        println!();
    }
    println!("{}", session.core().reg);
    println!("{}", session.core().reg.flags);
    session.check_criteria()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn asm_files(dir: &str) -> Vec<std::path::PathBuf> {
        let mut v: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().map(|x| x == "asm").unwrap_or(false))
            .collect();
        v.sort();
        v
    }

    #[test]
    fn rudimentary() {
        let mut s = session::Session::new();
        s.assemble("mov ax, 1\nor ax, 2\nhlt").unwrap();
        let r = s.run().unwrap();
        assert_eq!(r.cpu.ax, 3);
        assert_eq!(r.state, RunState::Halted);
    }

    // every program in test/ must assemble, run to completion and pass
    // its embedded criteria
    #[test]
    fn various_programs() {
        let files = asm_files("test");
        assert!(!files.is_empty());
        for path in files {
            process_file(path.to_str().unwrap())
                .unwrap_or_else(|e| panic!("{}: {:?}", path.display(), e));
        }
    }

    // every program in test/errors must stop with a runtime fault or by
    // blowing the step budget
    #[test]
    fn runtime_errors() {
        let files = asm_files("test/errors");
        assert!(!files.is_empty());
        for path in files {
            let e = process_file(path.to_str().unwrap()).unwrap_err();
            assert!(
                matches!(e.kind, ErrorKind::Runtime | ErrorKind::StepLimit),
                "{}: {:?}",
                path.display(),
                e
            );
        }
    }

    #[test]
    fn assembly_errors_are_reported_in_bulk() {
        let s = session::Session::new();
        let errors = s.try_compile("mov [1], [2]\nbogus ax, 1\nmov ax, #\n").unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.is_assembly()));
    }
}
