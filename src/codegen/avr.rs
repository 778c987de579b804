//! Emisión para AVR ATmega328P.
//!
//! # Manual de ISA
//! <https://ww1.microchip.com/downloads/en/devicedoc/atmel-0856-avr-instruction-set-manual.pdf>
//!
//! El listado resultante es fuente para el ensamblador de Atmel/Microchip
//! (`avrasm2`). Se compone de, en orden: el preámbulo del runtime, el código
//! de cada línea bajo `main`, un ciclo de espera y el segmento de datos.

use crate::ir::{Instruction, Program};
use std::io::{self, Write};

/// Etiqueta del ciclo de espera al terminar el programa.
const HALT: &str = "halt";

struct Context<'a, W> {
    output: &'a mut W,
}

impl<W: Write> Context<'_, W> {
    fn output(&mut self) -> &mut W {
        self.output
    }

    fn instruction(&mut self, instruction: &Instruction) -> io::Result<()> {
        use Instruction::*;

        match instruction {
            Comment(text) => writeln!(self.output(), "; {}", text),
            SetLabel(label) => writeln!(self.output(), "{}:", label),
            LoadImmediate(reg, value) => emit!(self, "LDI", "{}, {}", reg, value),
            LoadDirect(reg, address) => emit!(self, "LDS", "{}, {}", reg, address),
            StoreDirect(address, reg) => emit!(self, "STS", "{}, {}", address, reg),
            Move(to, from) => emit!(self, "MOV", "{}, {}", to, from),
            Or(to, from) => emit!(self, "OR", "{}, {}", to, from),
            Subtract(to, from) => emit!(self, "SUB", "{}, {}", to, from),
            SubtractImmediate(reg, value) => emit!(self, "SUBI", "{}, {}", reg, value),
            SubtractImmediateCarry(reg, value) => emit!(self, "SBCI", "{}, {}", reg, value),
            Call(subroutine) => emit!(self, "RCALL", "{}", subroutine),
            Jump(label) => emit!(self, "RJMP", "{}", label),
            BranchIfNotEqual(label) => emit!(self, "BRNE", "{}", label),
        }
    }
}

/// Escribe un programa completo como ensamblador AVR.
pub fn emit<W: Write>(program: &Program, output: &mut W) -> io::Result<()> {
    runtime::write_preamble(output)?;
    writeln!(output, "\nmain:")?;

    let mut cx = Context {
        output: &mut *output,
    };

    for instruction in &program.body {
        cx.instruction(instruction)?;
    }

    writeln!(cx.output(), "{}:", HALT)?;
    emit!(cx, "RJMP", "{}", HALT)?;

    writeln!(output, "\n.dseg")?;
    for slot in 1..=program.temporaries {
        writeln!(output, "T{}_L: .byte 1", slot)?;
        writeln!(output, "T{}_H: .byte 1", slot)?;
    }

    writeln!(output)?;
    runtime::write_data_segment(output, program.lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Address, Byte, Label, LabelKind, Reg, Slot, Subroutine};

    fn render(body: Vec<Instruction>, temporaries: u32) -> String {
        let program = Program {
            body,
            lines: 1,
            temporaries,
        };

        let mut output = Vec::new();
        emit(&program, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn instructions_are_aligned() {
        let label = Label {
            kind: LabelKind::Else,
            id: 3,
        };

        let text = render(
            vec![
                Instruction::Comment(String::from("IF-ELSE expression")),
                Instruction::LoadImmediate(Reg(24), 0),
                Instruction::StoreDirect(Address::Slot(Slot(1), Byte::High), Reg(25)),
                Instruction::Call(Subroutine::IsF16Zero),
                Instruction::BranchIfNotEqual(label),
                Instruction::SetLabel(label),
            ],
            1,
        );

        let main = text.find("\nmain:\n").unwrap();
        let expected = "\
main:
; IF-ELSE expression
\tLDI     r24, 0
\tSTS     T1_H, r25
\tRCALL   is_f16_zero
\tBRNE    else_3
else_3:
halt:
\tRJMP    halt
";

        assert!(text[main + 1..].starts_with(expected));
    }

    #[test]
    fn data_segment_lists_temporaries() {
        let text = render(Vec::new(), 2);
        let data = &text[text.find(".dseg").unwrap()..];

        assert!(data.starts_with(".dseg\nT1_L: .byte 1\nT1_H: .byte 1\nT2_L: .byte 1\nT2_H: .byte 1\n"));
        assert!(data.contains("results: .byte 2\n"));
        assert!(data.contains("storeVal: .byte 2\n"));
    }
}
