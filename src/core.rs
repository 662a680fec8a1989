//! The machine itself: register file, memory, ports, and run state.
//! The execution engine lives in runtime.rs.
use super::*;

/// Lifecycle of a loaded program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// program loaded, nothing executed yet
    Ready,
    /// at least one instruction executed, more remain
    Running,
    /// ran off the end of the program or executed HLT
    Halted,
    /// a runtime error stopped the machine; only a fresh load recovers it
    Faulted,
}

/// An I/O event the machine cannot service itself, surfaced to the
/// caller after the step that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// INT 0x21: print the character in DL
    Print(char),
    /// IN AL, port: the staged port value was consumed
    PortRead { port: u8 },
    /// OUT port, AL
    PortWrite { port: u8, value: u8 },
}

pub struct Core {
    pub reg: registers::Set,
    pub mem: memory::Memory,
    pub ports: memory::Ports,
    pub state: RunState,
    /// offset just past the last program byte in the code segment
    pub program_end: u16,
    pub instruction_count: u64,
    pub trace: bool,
}

impl Core {
    pub fn new() -> Core {
        Core {
            reg: registers::Set::default(),
            mem: memory::Memory::default(),
            ports: memory::Ports::default(),
            state: RunState::Ready,
            program_end: 0,
            instruction_count: 0,
            trace: config::ARGS.trace,
        }
    }
    /// Clear the machine and load a freshly assembled program at CS:0000.
    /// The image writes are journaled so the caller can pick them up as
    /// the program's initial memory deltas.
    pub fn load_program(&mut self, program: &assembler::Program) {
        self.reg.reset();
        self.mem = memory::Memory::default();
        self.mem.load(self.reg.cs, 0, &program.image);
        self.program_end = program.image.len() as u16;
        self.instruction_count = 0;
        self.state = RunState::Ready;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_program_resets_and_journals_the_image() {
        let program = assembler::Assembler::new().assemble_str("mov al, 7\nhlt").unwrap();
        let mut core = Core::new();
        core.reg.ax = 0xdead;
        core.load_program(&program);
        assert_eq!(core.state, RunState::Ready);
        assert_eq!(core.reg.ax, 0);
        assert_eq!(core.reg.ip, 0);
        assert_eq!(core.reg.sp, 0xfffe);
        assert_eq!(core.program_end, 3);
        assert_eq!(core.mem.read_u8(core.reg.cs, 0), 0xb0);
        assert_eq!(core.mem.take_deltas().len(), 3);
    }
}
