//! Representación intermedia.
//!
//! Las instrucciones de este módulo corresponden una a una con las
//! instrucciones AVR que emite [`crate::codegen::emit()`]. No hay
//! asignación de registros posterior: los únicos registros que aparecen
//! son los de la convención de llamada del runtime y unos pocos de
//! trabajo para el contador de `FOR`.

use std::{
    fmt::{self, Display},
    io::{self, Write},
};

pub use runtime::Subroutine;

/// Registro de propósito general `r0`-`r31`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Reg(pub u8);

impl Display for Reg {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Reg(number) = self;
        write!(fmt, "r{}", number)
    }
}

/// Espacio temporal de dos bytes en el segmento de datos.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Slot(pub u32);

impl Display for Slot {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Slot(number) = self;
        write!(fmt, "T{}", number)
    }
}

/// Mitad de un valor de 16 bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Byte {
    Low,
    High,
}

/// Dirección de datos accesible con `LDS`/`STS`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Slot(Slot, Byte),

    /// Desplazamiento en bytes dentro de la tabla de resultados.
    Results(usize),
}

impl Display for Address {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Slot(slot, Byte::Low) => write!(fmt, "{}_L", slot),
            Address::Slot(slot, Byte::High) => write!(fmt, "{}_H", slot),
            Address::Results(offset) => write!(fmt, "{}+{}", runtime::RESULTS, offset),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LabelKind {
    Else,
    EndIf,
    ForStart,
    ForEnd,
    Skip,
}

/// Destino de salto.
///
/// Todas las etiquetas de una misma construcción comparten `id`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub kind: LabelKind,
    pub id: u32,
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            LabelKind::Else => "else",
            LabelKind::EndIf => "endif",
            LabelKind::ForStart => "for_start",
            LabelKind::ForEnd => "for_end",
            LabelKind::Skip => "skip",
        };

        write!(fmt, "{}_{}", prefix, self.id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Comment(String),
    SetLabel(Label),
    LoadImmediate(Reg, u8),
    LoadDirect(Reg, Address),
    StoreDirect(Address, Reg),
    Move(Reg, Reg),
    Or(Reg, Reg),
    Subtract(Reg, Reg),
    SubtractImmediate(Reg, u8),
    SubtractImmediateCarry(Reg, u8),
    Call(Subroutine),
    Jump(Label),
    BranchIfNotEqual(Label),
}

/// Programa generado, listo para emitirse.
#[derive(Clone, Debug)]
pub struct Program {
    pub body: Vec<Instruction>,
    pub lines: usize,
    pub temporaries: u32,
}

impl Program {
    /// Escribe el listado ensamblador completo.
    pub fn write_asm<W: Write>(&self, output: &mut W) -> io::Result<()> {
        crate::codegen::emit(self, output)
    }
}
