//! The facade an interactive front end drives: assemble a source
//! buffer, then single-step or run the loaded program, getting back
//! exactly the state that changed so the UI can repaint incrementally.
use super::*;

pub struct Session {
    asm: assembler::Assembler,
    core: Core,
    program: Option<assembler::Program>,
    step_limit: u64,
}

/// Everything a front end needs to repaint after an assemble: the reset
/// registers, the per-line listing, and the image bytes as memory deltas.
pub struct AssembleOutcome {
    pub cpu: registers::Set,
    pub lines: Vec<assembler::EncodedInstruction>,
    pub memory_deltas: Vec<(u32, u8)>,
}

pub struct StepOutcome {
    pub cpu: registers::Set,
    /// source line of the next instruction to execute, for highlighting
    pub line: Option<usize>,
    pub interrupt: Option<Interrupt>,
    pub memory_deltas: Vec<(u32, u8)>,
    pub state: RunState,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub cpu: registers::Set,
    pub interrupts: Vec<Interrupt>,
    pub memory_deltas: Vec<(u32, u8)>,
    pub state: RunState,
}

impl Session {
    pub fn new() -> Session {
        Session {
            asm: assembler::Assembler::new(),
            core: Core::new(),
            program: None,
            step_limit: config::ARGS.step_limit,
        }
    }
    pub fn with_step_limit(limit: u64) -> Session {
        let mut s = Session::new();
        s.step_limit = limit;
        s
    }

    /// Assemble and load a program, replacing whatever was loaded before.
    /// On failure the previous program stays loaded and untouched.
    pub fn assemble(&mut self, src: &str) -> Result<AssembleOutcome, Vec<Error>> {
        let program = self.asm.assemble_str(src)?;
        self.core.load_program(&program);
        let out = AssembleOutcome {
            cpu: self.core.reg,
            lines: program.lines.clone(),
            memory_deltas: self.core.mem.take_deltas(),
        };
        self.program = Some(program);
        Ok(out)
    }

    /// Assemble without loading, for checking a buffer as the user types.
    pub fn try_compile(&self, src: &str) -> Result<(), Vec<Error>> {
        self.asm.assemble_str(src).map(|_| ())
    }

    pub fn step(&mut self) -> Result<StepOutcome, Error> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| general_err!("no program loaded"))?;
        let o = self.core.step()?;
        Ok(StepOutcome {
            cpu: self.core.reg,
            line: program.line_at_offset(self.core.reg.ip),
            interrupt: o.interrupt,
            memory_deltas: o.deltas,
            state: self.core.state,
        })
    }

    pub fn run(&mut self) -> Result<RunOutcome, Error> {
        if self.program.is_none() {
            return Err(general_err!("no program loaded"));
        }
        let o = self.core.run(self.step_limit)?;
        Ok(RunOutcome {
            cpu: self.core.reg,
            interrupts: o.interrupts,
            memory_deltas: o.deltas,
            state: self.core.state,
        })
    }

    /// Stage bytes in the I/O space starting at the given port, wrapping
    /// within the 256-port range. The next IN from those ports consumes
    /// them. Returns the current register snapshot, like `step` and `run`.
    pub fn set_port(&mut self, port: u8, bytes: &[u8]) -> registers::Set {
        for (i, b) in bytes.iter().enumerate() {
            self.core.ports.set(port.wrapping_add(i as u8), *b);
        }
        self.core.reg
    }

    /// Evaluate every `;!` criterion in the loaded program against the
    /// machine, printing a PASS/FAIL line for each.
    pub fn check_criteria(&self) -> Result<(), Error> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| general_err!("no program loaded"))?;
        let mut failed = 0usize;
        for c in &program.criteria {
            match c.eval(&self.core, &program.symbols) {
                Ok(()) => println!(concat!(green!("PASS"), " {}"), c),
                Err(e) => {
                    failed += 1;
                    println!(concat!(red!("FAIL"), " {}: {}"), c, e.msg);
                }
            }
        }
        if failed > 0 {
            return Err(Error::new(
                ErrorKind::Test,
                None,
                format!("failed {} of {} test criteria", failed, program.criteria.len()).as_str(),
            ));
        }
        Ok(())
    }

    pub fn core(&self) -> &Core { &self.core }
    pub fn program(&self) -> Option<&assembler::Program> { self.program.as_ref() }
}
