//! Compilador de expresiones RPN para AVR ATmega328P.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un AST por medio de análisis sintáctico en [`parse`].
//! El árbol sintáctico es procesado por análisis semántico en
//! [`semantic`], el cual resuelve tipos y evalúa constantes sobre
//! un árbol nuevo, con lo cual concluyen las fases delanteras del
//! compilador.
//!
//! # Back end
//! En esta sección el compilador deja de ser agnóstico al sistema
//! objetivo. [`codegen`] linealiza el árbol anotado en las instrucciones
//! de [`ir`], asignando espacios temporales y etiquetas de salto, y
//! finalmente las emite como ensamblador AVR. La aritmética float16
//! no existe en hardware: el código generado invoca las rutinas del
//! crate `runtime`, cuyo listado se antepone a cada programa.
//!
//! # Errores
//! Toda fase falla con un error ubicado. [`compile()`] los convierte
//! en [`error::Diagnostics`], listos para mostrarse al usuario.

use std::io::BufRead;

use bitflags::bitflags;

#[macro_use]
mod macros;

pub mod codegen;
pub mod error;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod semantic;
pub mod source;

use error::Diagnostics;
use lex::Lexer;
use parse::ParserOptions;
use semantic::Analyzer;

bitflags! {
    /// Opciones que alteran la semántica del programa.
    pub struct CompileOptions: u32 {
        /// Deshabilitar promoción automática de `INT` a `FLOAT`.
        ///
        /// Una operación con operandos de tipos distintos es
        /// un error en vez de una conversión implícita.
        const STRICT_TYPES = 0x01;
    }
}

/// Ejecuta todas las fases sobre un archivo de código fuente.
///
/// `name` identifica al origen en los diagnósticos.
pub fn compile<R: BufRead>(
    reader: R,
    name: &str,
    options: CompileOptions,
) -> Result<ir::Program, Diagnostics> {
    let (start, stream) = source::consume(reader, name);

    let tokens = Lexer::new(start, stream)
        .tokenize()
        .map_err(|error| Diagnostics::from(error).kind("Lexical error"))?;

    let ast = parse::parse(&tokens, ParserOptions::default())
        .map_err(|error| Diagnostics::from(error).kind("Syntax error"))?;

    let program = Analyzer::new(options)
        .analyze(&ast)
        .map_err(|error| Diagnostics::from(error).kind("Semantic error"))?;

    codegen::generate(program.root())
        .map_err(|error| Diagnostics::from(error).kind("Code generation error"))
}
