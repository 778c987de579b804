//! Generación de código.
//!
//! # Modelo de ejecución
//! Todo resultado intermedio se materializa en un espacio temporal de dos
//! bytes en memoria ([`Slot`]). No existen registros vivos entre dos
//! operaciones: antes de cada llamada al runtime los operandos se cargan
//! en los registros de la convención de llamada y el resultado se guarda
//! de inmediato en un espacio nuevo. Los espacios y las etiquetas se
//! numeran de manera monótona durante una sola generación.
//!
//! # Árboles de entrada
//! La generación acepta tanto el árbol del parser como el árbol anotado
//! del análisis semántico, a través de [`Tree`]. Solo el segundo conoce
//! constantes evaluadas de expresiones completas; con el primero cada
//! operación se genera explícitamente.
//!
//! # Constantes
//! Una constante que no es una hoja se carga directamente como float16.
//! Si excede el rango del formato se genera la expresión completa y un
//! comentario lo registra.

use std::fmt::{self, Display};

use half::f16;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    ir::{
        self, Address, Byte, Instruction, Label as JumpLabel, LabelKind, Reg, Slot, Subroutine,
    },
    lex::{Keyword, Operator},
    parse::{self, Label, Node, NonTerminal},
    semantic::Annotated,
    source::{Located, Location},
};

use runtime::Pair;

mod avr;

pub use avr::emit;

/// Error de generación de código.
///
/// Solo ocurre con árboles que no pasaron por análisis semántico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Malformed '{0}' node")]
    Malformed(Label),

    #[error("Incomplete conditional")]
    IncompleteConditional,

    #[error("Constant {0} is not representable as a 16-bit float")]
    Unrepresentable(String),

    #[error("Results index {0} is out of reach for 'RES'")]
    ResultIndex(i64),

    #[error("Code generation for node '{0}' is not implemented")]
    NoRule(Label),
}

type Generate<T> = Result<T, Located<GeneratorError>>;

/// Árbol del cual puede generarse código.
pub trait Tree: Sized {
    fn label(&self) -> &Label;

    fn children(&self) -> &[Self];

    fn location(&self) -> Option<&Location>;

    /// Valor conocido en tiempo de compilación.
    fn constant(&self) -> Option<f64>;

    /// Indica si el análisis marcó al nodo para promoción a `FLOAT`.
    fn needs_cast(&self) -> bool;
}

impl Tree for Node {
    fn label(&self) -> &Label {
        Node::label(self)
    }

    fn children(&self) -> &[Self] {
        Node::children(self)
    }

    fn location(&self) -> Option<&Location> {
        Node::location(self)
    }

    fn constant(&self) -> Option<f64> {
        match self.label() {
            Label::Literal(text) => text.parse().ok(),
            _ => None,
        }
    }

    fn needs_cast(&self) -> bool {
        false
    }
}

impl Tree for Annotated {
    fn label(&self) -> &Label {
        Annotated::label(self)
    }

    fn children(&self) -> &[Self] {
        Annotated::children(self)
    }

    fn location(&self) -> Option<&Location> {
        self.token().map(Located::location)
    }

    fn constant(&self) -> Option<f64> {
        self.value().map(|value| value.as_f64())
    }

    fn needs_cast(&self) -> bool {
        Annotated::needs_cast(self)
    }
}

/// Ubicación de un valor ya calculado.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Operand {
    Immediate(f16),
    Temporary(Slot),
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Immediate(value) => write!(fmt, "{}", value),
            Operand::Temporary(slot) => write!(fmt, "{}", slot),
        }
    }
}

/// Genera el programa completo a partir de un nodo `<program>`.
pub fn generate<T: Tree>(root: &T) -> Generate<ir::Program> {
    if root.label() != &Label::NonTerminal(NonTerminal::Program) {
        return Err(fail(root, GeneratorError::Malformed(root.label().clone())));
    }

    let lines = parse::program_lines(root, T::children);

    let mut generator = Generator::default();
    for (index, line) in lines.iter().enumerate() {
        generator.line(*line, index)?;
    }

    debug!(
        lines = lines.len(),
        temporaries = generator.temporaries,
        instructions = generator.body.len(),
        "code generation finished"
    );

    Ok(ir::Program {
        body: generator.body,
        lines: lines.len(),
        temporaries: generator.temporaries,
    })
}

#[derive(Default)]
struct Generator {
    body: Vec<Instruction>,
    temporaries: u32,
    labels: u32,
}

impl Generator {
    /// Genera una línea y publica su resultado.
    fn line<T: Tree>(&mut self, node: &T, index: usize) -> Generate<()> {
        self.comment(format!("--- Line {} ---", index + 1));

        let result = self.expression(node, index)?;
        self.comment(format!(
            "Store result of line {} from {} into results array",
            index + 1,
            result
        ));

        self.load(result, runtime::RETURN);

        let offset = index * runtime::VALUE_SIZE;
        self.push(Instruction::StoreDirect(
            Address::Results(offset),
            Reg(runtime::RETURN.low),
        ));

        self.push(Instruction::StoreDirect(
            Address::Results(offset + 1),
            Reg(runtime::RETURN.high),
        ));

        self.push(Instruction::Call(Subroutine::PrintF16));
        Ok(())
    }

    fn expression<T: Tree>(&mut self, node: &T, line: usize) -> Generate<Operand> {
        trace!(label = %node.label(), line, "generate");

        let is_leaf = node.children().is_empty();
        if let (Label::Literal(text), true) = (node.label(), is_leaf) {
            return literal(node, text);
        }

        if let Some(value) = node.constant() {
            match encode(value) {
                Some(half) => {
                    self.comment(format!("Constant folded value: {}", value));

                    let slot = self.temporary();
                    self.load(Operand::Immediate(half), runtime::RETURN);
                    self.store(slot, runtime::RETURN);

                    return Ok(Operand::Temporary(slot));
                }

                None => self.comment(format!(
                    "Constant value {} is out of range for 16-bit float. \
                     Generating full expression instead.",
                    value
                )),
            }
        }

        match node.label() {
            Label::Operator(operator) => self.binary(node, *operator, line),
            Label::Keyword(Keyword::Else) => self.conditional(node, line),
            Label::Keyword(Keyword::For) => self.repeat(node, line),
            Label::Keyword(Keyword::Res) => self.res(node, line),
            Label::Keyword(Keyword::Mem) => self.mem(node, line),

            Label::Keyword(Keyword::If | Keyword::Then) => {
                Err(fail(node, GeneratorError::IncompleteConditional))
            }

            label => Err(fail(node, GeneratorError::NoRule(label.clone()))),
        }
    }

    /// Evalúa un operando, registrando la promoción si existe.
    ///
    /// Todo valor en tiempo de ejecución ya es float16, por lo que la
    /// promoción no requiere instrucciones.
    fn operand<T: Tree>(&mut self, node: &T, line: usize) -> Generate<Operand> {
        let operand = self.expression(node, line)?;
        if node.needs_cast() {
            self.comment(format!("Promote {} to FLOAT", operand));
        }

        Ok(operand)
    }

    fn binary<T: Tree>(&mut self, node: &T, operator: Operator, line: usize) -> Generate<Operand> {
        let (left, right) = match node.children() {
            [left, right] => (left, right),
            _ => return Err(malformed(node)),
        };

        let left = self.operand(left, line)?;
        let right = self.operand(right, line)?;

        let subroutine = match operator {
            Operator::Add => Subroutine::AddF16,
            Operator::Sub => Subroutine::SubF16,
            Operator::Mul => Subroutine::MulF16,
            Operator::Pow => Subroutine::PowF16,
            Operator::RealDiv => Subroutine::DivF16,
            Operator::Div => Subroutine::DivIntF16,
            Operator::Mod => Subroutine::ModF16,
        };

        self.comment(format!("Binary op: {} {} {}", left, operator, right));
        self.load(left, runtime::ARG_A);
        self.load(right, runtime::ARG_B);
        self.push(Instruction::Call(subroutine));

        let result = self.temporary();
        self.store(result, runtime::RETURN);

        Ok(Operand::Temporary(result))
    }

    /// `((c IF) a THEN) b ELSE`
    fn conditional<T: Tree>(&mut self, node: &T, line: usize) -> Generate<Operand> {
        let (then, otherwise) = match node.children() {
            [then, otherwise] if then.label() == &Label::Keyword(Keyword::Then) => {
                (then, otherwise)
            }

            _ => return Err(fail(node, GeneratorError::IncompleteConditional)),
        };

        let (condition, body) = match then.children() {
            [condition, body] if condition.label() == &Label::Keyword(Keyword::If) => {
                (condition, body)
            }

            _ => return Err(fail(then, GeneratorError::IncompleteConditional)),
        };

        let condition = match condition.children() {
            [condition] => condition,
            _ => return Err(malformed(condition)),
        };

        let id = self.label_id();
        let else_label = JumpLabel {
            kind: LabelKind::Else,
            id,
        };

        let end_label = JumpLabel {
            kind: LabelKind::EndIf,
            id,
        };

        let skip_label = JumpLabel {
            kind: LabelKind::Skip,
            id,
        };

        let result = self.temporary();

        let condition = self.operand(condition, line)?;
        self.comment(String::from("IF-ELSE expression"));
        self.load(condition, runtime::ARG_A);
        self.push(Instruction::Call(Subroutine::IsF16Zero));

        // BREQ solo alcanza ±64 palabras, RJMP cubre cuerpos grandes
        self.push(Instruction::BranchIfNotEqual(skip_label));
        self.push(Instruction::Jump(else_label));
        self.push(Instruction::SetLabel(skip_label));

        let then_value = self.operand(body, line)?;
        self.load(then_value, runtime::RETURN);
        self.store(result, runtime::RETURN);
        self.push(Instruction::Jump(end_label));

        self.push(Instruction::SetLabel(else_label));
        let else_value = self.operand(otherwise, line)?;
        self.load(else_value, runtime::RETURN);
        self.store(result, runtime::RETURN);

        self.push(Instruction::SetLabel(end_label));
        Ok(Operand::Temporary(result))
    }

    /// `(n body FOR)`: el resultado es el del último ciclo, o cero.
    fn repeat<T: Tree>(&mut self, node: &T, line: usize) -> Generate<Operand> {
        let (count, body) = match node.children() {
            [count, body] => (count, body),
            _ => return Err(malformed(node)),
        };

        let id = self.label_id();
        let start_label = JumpLabel {
            kind: LabelKind::ForStart,
            id,
        };

        let end_label = JumpLabel {
            kind: LabelKind::ForEnd,
            id,
        };

        let skip_label = JumpLabel {
            kind: LabelKind::Skip,
            id,
        };

        let result = self.temporary();
        let counter = self.temporary();

        self.comment(String::from("FOR loop setup"));
        self.load(Operand::Immediate(f16::ZERO), runtime::RETURN);
        self.store(result, runtime::RETURN);

        let count = self.operand(count, line)?;
        self.load(count, runtime::ARG_B);
        self.push(Instruction::Call(Subroutine::F16ToUint16));
        self.store(counter, runtime::UINT_RETURN);

        // El contador vive en memoria, el cuerpo puede destruir cualquier registro
        let (low, high, scratch) = (Reg(20), Reg(21), Reg(16));

        self.push(Instruction::SetLabel(start_label));
        self.push(Instruction::LoadDirect(low, Address::Slot(counter, Byte::Low)));
        self.push(Instruction::LoadDirect(high, Address::Slot(counter, Byte::High)));
        self.push(Instruction::Move(scratch, low));
        self.push(Instruction::Or(scratch, high));
        self.push(Instruction::BranchIfNotEqual(skip_label));
        self.push(Instruction::Jump(end_label));
        self.push(Instruction::SetLabel(skip_label));

        let value = self.operand(body, line)?;
        self.load(value, runtime::RETURN);
        self.store(result, runtime::RETURN);

        self.push(Instruction::LoadDirect(low, Address::Slot(counter, Byte::Low)));
        self.push(Instruction::LoadDirect(high, Address::Slot(counter, Byte::High)));
        self.push(Instruction::SubtractImmediate(low, 1));
        self.push(Instruction::SubtractImmediateCarry(high, 0));
        self.push(Instruction::StoreDirect(Address::Slot(counter, Byte::Low), low));
        self.push(Instruction::StoreDirect(Address::Slot(counter, Byte::High), high));
        self.push(Instruction::Jump(start_label));

        self.push(Instruction::SetLabel(end_label));
        Ok(Operand::Temporary(result))
    }

    fn res<T: Tree>(&mut self, node: &T, line: usize) -> Generate<Operand> {
        let back = match node.children() {
            [back] => back,
            _ => return Err(malformed(node)),
        };

        let index = Reg(runtime::LINE_INDEX);

        match back.constant().filter(|value| value.fract() == 0.0) {
            Some(value) => {
                let target = reachable(node, (line as i64).saturating_sub(value as i64))?;
                self.comment(format!(
                    "RES op: get result from {} lines back (accessing results index {})",
                    value, target
                ));

                self.push(Instruction::LoadImmediate(index, target));
            }

            None => {
                let current = reachable(node, line as i64)?;
                let value = self.operand(back, line)?;
                self.comment(format!("RES op: get result from {} lines back", value));

                self.load(value, runtime::ARG_B);
                self.push(Instruction::Call(Subroutine::F16ToUint16));
                self.push(Instruction::LoadImmediate(index, current));
                self.push(Instruction::Subtract(index, Reg(runtime::UINT_RETURN.low)));
            }
        }

        self.push(Instruction::Call(Subroutine::ResOp));

        let result = self.temporary();
        self.store(result, runtime::RETURN);

        Ok(Operand::Temporary(result))
    }

    fn mem<T: Tree>(&mut self, node: &T, line: usize) -> Generate<Operand> {
        match node.children() {
            [] => {
                self.comment(String::from("MEM read"));
                self.push(Instruction::Call(Subroutine::GetMem));
            }

            [value] => {
                let value = self.operand(value, line)?;
                self.comment(String::from("MEM write"));
                self.load(value, runtime::ARG_A);
                self.push(Instruction::Call(Subroutine::SetMem));
            }

            _ => return Err(malformed(node)),
        }

        let result = self.temporary();
        self.store(result, runtime::RETURN);

        Ok(Operand::Temporary(result))
    }

    fn load(&mut self, operand: Operand, pair: Pair) {
        let (low, high) = (Reg(pair.low), Reg(pair.high));

        match operand {
            Operand::Immediate(value) => {
                let [low_byte, high_byte] = value.to_le_bytes();
                self.push(Instruction::LoadImmediate(low, low_byte));
                self.push(Instruction::LoadImmediate(high, high_byte));
            }

            Operand::Temporary(slot) => {
                self.push(Instruction::LoadDirect(low, Address::Slot(slot, Byte::Low)));
                self.push(Instruction::LoadDirect(high, Address::Slot(slot, Byte::High)));
            }
        }
    }

    fn store(&mut self, slot: Slot, pair: Pair) {
        self.push(Instruction::StoreDirect(
            Address::Slot(slot, Byte::Low),
            Reg(pair.low),
        ));

        self.push(Instruction::StoreDirect(
            Address::Slot(slot, Byte::High),
            Reg(pair.high),
        ));
    }

    fn temporary(&mut self) -> Slot {
        self.temporaries += 1;
        Slot(self.temporaries)
    }

    fn label_id(&mut self) -> u32 {
        self.labels += 1;
        self.labels
    }

    fn comment(&mut self, text: String) {
        self.push(Instruction::Comment(text));
    }

    fn push(&mut self, instruction: Instruction) {
        self.body.push(instruction);
    }
}

/// Una hoja constante nunca ocupa un espacio temporal.
fn literal<T: Tree>(node: &T, text: &str) -> Generate<Operand> {
    let value = node
        .constant()
        .ok_or_else(|| malformed(node))?;

    encode(value)
        .map(Operand::Immediate)
        .ok_or_else(|| fail(node, GeneratorError::Unrepresentable(text.to_owned())))
}

/// Convierte a float16, fallando si el valor no es finito en ese formato.
fn encode(value: f64) -> Option<f16> {
    let half = f16::from_f64(value);
    (value.is_finite() && half.is_finite()).then(|| half)
}

/// Índice de la tabla de resultados alcanzable por `res_op`.
fn reachable<T: Tree>(node: &T, index: i64) -> Generate<u8> {
    match u8::try_from(index) {
        Ok(index) if index <= runtime::MAX_LINE_INDEX => Ok(index),
        _ => Err(fail(node, GeneratorError::ResultIndex(index))),
    }
}

fn malformed<T: Tree>(node: &T) -> Located<GeneratorError> {
    fail(node, GeneratorError::Malformed(node.label().clone()))
}

fn fail<T: Tree>(node: &T, error: GeneratorError) -> Located<GeneratorError> {
    let location = node.location().cloned().unwrap_or_else(Location::unknown);
    Located::at(error, location)
}
