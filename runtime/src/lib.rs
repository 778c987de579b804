//! Biblioteca de soporte para `rpnc`.
//!
//! # Propósito
//! El lenguaje RPN opera exclusivamente sobre valores de punto flotante
//! de 16 bits (IEEE 754 half-precision), los cuales el ATmega328P no
//! soporta en hardware. Esta biblioteca contiene las rutinas AVR que
//! implementan dicha aritmética, así como E/S serial, la celda `MEM` y
//! el acceso a la tabla de resultados que requiere `RES`.
//!
//! # Enlazado
//! No existe un paso de enlazado separado. Los listados de este crate se
//! emiten textualmente al inicio de cada programa generado (ver
//! [`write_preamble()`]), seguidos de la etiqueta `main` y el código del
//! usuario. El segmento de datos debe terminar con [`write_data_segment()`],
//! el cual declara los símbolos de los que dependen las rutinas.
//!
//! # Convención de llamada
//! Un valor float16 viaja en un par de registros `(bajo, alto)`:
//! - Las operaciones binarias reciben A en [`ARG_A`] (`r25:r24`) y B en
//!   [`ARG_B`] (`r23:r22`), y retornan en [`RETURN`] (`r25:r24`).
//! - `is_f16_zero` recibe un operando en `r25:r24` y comunica su resultado
//!   únicamente a través de la bandera Z de `SREG`.
//! - `set_mem` y `get_mem` escriben y leen la celda `storeVal` vía `r25:r24`.
//! - `res_op` recibe en [`LINE_INDEX`] (`r24`) el índice base cero de una
//!   línea y retorna su resultado en `r25:r24`.
//! - `f16_to_uint16` recibe en `r23:r22` y retorna un entero sin signo en
//!   [`UINT_RETURN`] (`r27:r26`).
//!
//! Cada rutina documenta en su propio listado los registros que preserva y
//! los que destruye. El código generado no debe asumir nada más allá de
//! esta interfaz: los algoritmos internos de las rutinas no forman parte
//! del contrato.

use std::{
    fmt::{self, Display},
    io::{self, Write},
};

/// Símbolo de la tabla de resultados por línea.
pub const RESULTS: &str = "results";

/// Símbolo de la celda persistente de `MEM`.
pub const MEMORY_CELL: &str = "storeVal";

/// Bytes que ocupa un valor float16.
pub const VALUE_SIZE: usize = 2;

/// Máximo índice de línea direccionable por `res_op`.
///
/// La rutina duplica el índice en un único registro de 8 bits.
pub const MAX_LINE_INDEX: u8 = 127;

/// Par de registros que transporta un valor de 16 bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pair {
    pub low: u8,
    pub high: u8,
}

/// Operando A de rutinas binarias y de rutinas unarias.
pub const ARG_A: Pair = Pair { low: 24, high: 25 };

/// Operando B de rutinas binarias.
pub const ARG_B: Pair = Pair { low: 22, high: 23 };

/// Valor de retorno float16.
pub const RETURN: Pair = ARG_A;

/// Valor de retorno de `f16_to_uint16`.
pub const UINT_RETURN: Pair = Pair { low: 26, high: 27 };

/// Registro de entrada de `res_op`.
pub const LINE_INDEX: u8 = 24;

/// Rutina preconstruida invocable por el código generado.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Subroutine {
    AddF16,
    SubF16,
    MulF16,
    DivF16,
    DivIntF16,
    ModF16,
    PowF16,
    IsF16Zero,
    F16ToUint16,
    SetMem,
    GetMem,
    ResOp,
    PrintF16,
}

impl Subroutine {
    /// Símbolo de la etiqueta de entrada.
    pub fn symbol(self) -> &'static str {
        use Subroutine::*;

        match self {
            AddF16 => "add_f16",
            SubF16 => "sub_f16",
            MulF16 => "mul_f16",
            DivF16 => "div_f16",
            DivIntF16 => "div_int_f16",
            ModF16 => "mod_f16",
            PowF16 => "pow_f16",
            IsF16Zero => "is_f16_zero",
            F16ToUint16 => "f16_to_uint16",
            SetMem => "set_mem",
            GetMem => "get_mem",
            ResOp => "res_op",
            PrintF16 => "print_f16",
        }
    }
}

impl Display for Subroutine {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.symbol())
    }
}

/// Directivas de ensamblador y macro `store`.
const HEADER: &str = include_str!("../asm/header.asm");

/// Inicialización de la USART, se ejecuta antes de saltar a `main`.
const USART_CONFIG: &str = include_str!("../asm/usart_config.asm");

/// Listados en el orden en que se emiten.
///
/// `f16_to_uint16` se define dentro del listado de `pow_f16`.
const LISTINGS: &[&str] = &[
    include_str!("../asm/print_f16.asm"),
    include_str!("../asm/serial_comm.asm"),
    include_str!("../asm/add_f16.asm"),
    include_str!("../asm/sub_f16.asm"),
    include_str!("../asm/mul_f16.asm"),
    include_str!("../asm/div_f16.asm"),
    include_str!("../asm/div_int_f16.asm"),
    include_str!("../asm/mod_f16.asm"),
    include_str!("../asm/pow_f16.asm"),
    include_str!("../asm/res_op.asm"),
    include_str!("../asm/set_mem.asm"),
    include_str!("../asm/get_mem.asm"),
    include_str!("../asm/is_f16_zero.asm"),
];

/// Escribe el preámbulo completo: cabecera, inicialización y rutinas.
///
/// El preámbulo salta incondicionalmente a `main`, etiqueta que debe
/// definir quien emite el programa inmediatamente después.
pub fn write_preamble<W: Write>(output: &mut W) -> io::Result<()> {
    output.write_all(HEADER.as_bytes())?;
    writeln!(output)?;
    output.write_all(USART_CONFIG.as_bytes())?;
    writeln!(output, "\trjmp main")?;

    for listing in LISTINGS {
        writeln!(output)?;
        output.write_all(listing.as_bytes())?;
    }

    Ok(())
}

/// Escribe los símbolos de datos de los que dependen las rutinas.
///
/// Debe invocarse dentro de `.dseg`. `lines` es la cantidad de líneas
/// del programa, cada una con un espacio de [`VALUE_SIZE`] bytes en la
/// tabla de resultados.
pub fn write_data_segment<W: Write>(output: &mut W, lines: usize) -> io::Result<()> {
    writeln!(output, "{}: .byte {}", RESULTS, lines * VALUE_SIZE)?;
    writeln!(output, "    .equ lo8_results = (({}) & 0xFF)", RESULTS)?;
    writeln!(output, "    .equ hi8_results = ((({}) >> 8) & 0xFF)", RESULTS)?;
    writeln!(output, "{}: .byte {}", MEMORY_CELL, VALUE_SIZE)?;
    writeln!(output, "    .equ BUFFER_ADDR = 0x100")?;
    writeln!(output, "    .equ BUFFER_SIZE = 11")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preamble() -> String {
        let mut output = Vec::new();
        write_preamble(&mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn preamble_defines_every_subroutine() {
        use Subroutine::*;

        let preamble = preamble();
        for subroutine in [
            AddF16,
            SubF16,
            MulF16,
            DivF16,
            DivIntF16,
            ModF16,
            PowF16,
            IsF16Zero,
            F16ToUint16,
            SetMem,
            GetMem,
            ResOp,
            PrintF16,
        ] {
            let label = format!("\n{}:", subroutine);
            assert!(preamble.contains(&label), "missing {}", subroutine);
        }
    }

    #[test]
    fn preamble_jumps_to_main_after_setup() {
        let preamble = preamble();
        let include = preamble.find(".include").unwrap();
        let usart = preamble.find("UCSR0B").unwrap();
        let jump = preamble.find("rjmp main").unwrap();
        let first_routine = preamble.find("print_f16:").unwrap();

        assert!(include < usart && usart < jump && jump < first_routine);
    }

    #[test]
    fn data_segment_sizes_results_table() {
        let mut output = Vec::new();
        write_data_segment(&mut output, 3).unwrap();
        let data = String::from_utf8(output).unwrap();

        assert!(data.starts_with("results: .byte 6\n"));
        assert!(data.contains("storeVal: .byte 2"));
    }
}
