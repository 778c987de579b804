//! Análisis semántico.
//!
//! # Resultado
//! El analizador no modifica el árbol de entrada. Construye un árbol
//! [`Annotated`] nuevo, con la misma forma, en el que cada nodo conoce
//! su [`Type`], el signo de las constantes, si debe promoverse a `FLOAT`
//! y, cuando es posible, su valor ya evaluado.
//!
//! # Líneas
//! Cada expresión de nivel superior es una línea. El índice de la línea
//! en análisis acota a `RES`, que no puede mirar hacia el futuro ni
//! más allá del inicio del programa.
//!
//! # Promoción de tipos
//! Por omisión, un operando `INT` que se combina con uno `FLOAT` se marca
//! para conversión. Con [`CompileOptions::STRICT_TYPES`] la misma situación
//! es un error. El exponente de `^` queda fuera de ambas reglas, pues
//! siempre es `INT` sin importar el tipo de la base.

use std::fmt::{self, Display};

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    lex::{Keyword, Operator, Token},
    parse::{self, Ast, Label, Node, NonTerminal},
    source::{Located, Location},
    CompileOptions,
};

/// Error de análisis semántico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Integer literal out of range")]
    IntegerOutOfRange(String),

    #[error("Invalid numeric literal '{0}'")]
    BadLiteral(String),

    #[error("'{operator}' expects {expected} operand(s), but received {found}")]
    Arity {
        operator: Label,
        expected: &'static str,
        found: usize,
    },

    #[error("Operator '{operator}' expects numeric operands, but received {left} and {right}")]
    NotNumeric {
        operator: Operator,
        left: Type,
        right: Type,
    },

    #[error("Incompatible types for '{operator}': {left} and {right} (automatic promotion disabled)")]
    Incompatible {
        operator: Operator,
        left: Type,
        right: Type,
    },

    #[error("The exponent ('^') must be an INT, but got {0}")]
    ExponentNotInt(Type),

    #[error("The exponent ('^') must be a non-negative integer")]
    NegativeExponent,

    #[error("Division by literal zero")]
    DivisionByZero,

    #[error("'RES' expects an INT operand, but received {0}")]
    ResNotInt(Type),

    #[error("'RES' operand must be a positive integer")]
    ResNotPositive,

    #[error("Cannot 'RES' {back} lines back. Only {available} previous result(s) are available.")]
    ResOutOfRange { back: Value, available: usize },

    #[error("'MEM' (write) expects a numeric operand, but received {0}")]
    MemNotNumeric(Type),

    #[error("The IF condition must be numeric, but got type {0}")]
    ConditionNotNumeric(Type),

    #[error("The first operand for 'THEN' must be 'IF', but got '{0}'")]
    ExpectedIf(Label),

    #[error("The first operand for 'ELSE' must be 'THEN', but got '{0}'")]
    ExpectedThen(Label),

    #[error("Incompatible types in conditional branches")]
    BranchMismatch { then: Type, otherwise: Type },

    #[error("The loop count for 'FOR' must be an INT")]
    LoopCount(Type),

    #[error("The loop count for 'FOR' must not be negative")]
    NegativeLoopCount,

    #[error("'{0}' does not produce a value")]
    NotAValue(Label),

    #[error("Incomplete conditional")]
    IncompleteConditional,

    #[error("No semantic analysis rule found for node: '{0}'")]
    NoRule(Label),
}

type Semantic<T> = Result<T, Located<SemanticError>>;

/// Tipo de una expresión.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Void,
}

impl Type {
    fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Int => "INT",
            Type::Float => "FLOAT",
            Type::Void => "VOID",
        };

        fmt.write_str(name)
    }
}

/// Clasificación de signo de una constante.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
    Zero,
    Unknown,
}

impl Sign {
    fn of(value: f64) -> Self {
        if value > 0.0 {
            Sign::Positive
        } else if value < 0.0 {
            Sign::Negative
        } else {
            Sign::Zero
        }
    }
}

/// Valor conocido en tiempo de compilación.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Int(value) => value as f64,
            Value::Float(value) => value,
        }
    }

    /// Representa un resultado real según el tipo de la expresión.
    ///
    /// Solo los resultados enteros y dentro de rango se guardan como `Int`.
    pub fn from_real(value: f64, typ: Type) -> Self {
        let integral = value.is_finite() && value.fract() == 0.0;
        let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;

        match typ {
            Type::Int if integral && in_range => Value::Int(value as i64),
            _ => Value::Float(value),
        }
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(fmt, "{}", value),
            Value::Float(value) => write!(fmt, "{:?}", value),
        }
    }
}

/// Nodo del árbol anotado.
#[derive(Clone, Debug)]
pub struct Annotated {
    label: Label,
    children: Vec<Annotated>,
    typ: Type,
    sign: Sign,
    needs_cast: bool,
    value: Option<Value>,
    token: Option<Located<Token>>,
}

impl Annotated {
    fn from_node(node: &Node, children: Vec<Annotated>, typ: Type) -> Self {
        Annotated {
            label: node.label().clone(),
            children,
            typ,
            sign: Sign::Unknown,
            needs_cast: false,
            value: None,
            token: node.token().cloned(),
        }
    }

    fn void(label: NonTerminal, children: Vec<Annotated>) -> Self {
        Annotated {
            label: Label::NonTerminal(label),
            children,
            typ: Type::Void,
            sign: Sign::Unknown,
            needs_cast: false,
            value: None,
            token: None,
        }
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn children(&self) -> &[Annotated] {
        &self.children
    }

    pub fn typ(&self) -> Type {
        self.typ
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    /// Indica si el valor debe promoverse a `FLOAT` antes de usarse.
    pub fn needs_cast(&self) -> bool {
        self.needs_cast
    }

    /// Valor evaluado en tiempo de compilación, si se conoce.
    pub fn value(&self) -> Option<Value> {
        self.value
    }

    pub fn token(&self) -> Option<&Located<Token>> {
        self.token.as_ref()
    }
}

impl Display for Annotated {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: {}", self.label, self.typ)?;
        if let Some((first, rest)) = self.children.split_first() {
            write!(fmt, "({}", first)?;
            for child in rest {
                write!(fmt, ", {}", child)?;
            }

            fmt.write_str(")")?;
        }

        Ok(())
    }
}

/// Programa completamente anotado.
#[derive(Clone, Debug)]
pub struct Program(Annotated);

impl Program {
    pub fn root(&self) -> &Annotated {
        &self.0
    }

    /// Expresiones de nivel superior, una por línea de programa.
    pub fn lines(&self) -> Vec<&Annotated> {
        parse::program_lines(&self.0, Annotated::children)
    }
}

/// Analizador semántico.
pub struct Analyzer {
    options: CompileOptions,
}

impl Analyzer {
    pub fn new(options: CompileOptions) -> Self {
        Analyzer { options }
    }

    /// Analiza un programa completo.
    pub fn analyze(&self, ast: &Ast) -> Semantic<Program> {
        let lines = ast.lines();

        let mut annotated = Vec::with_capacity(lines.len());
        for (index, line) in lines.into_iter().enumerate() {
            annotated.push(self.line(line, index)?);
        }

        debug!(lines = annotated.len(), "semantic analysis finished");

        // Se reconstruye la cadena <program>/<program_tail> desde el final
        let mut lines = annotated.into_iter();
        let root = match lines.next() {
            None => Annotated::void(NonTerminal::Program, Vec::new()),
            Some(first) => {
                let tail = lines
                    .rev()
                    .fold(Annotated::void(NonTerminal::ProgramTail, Vec::new()), |tail, line| {
                        Annotated::void(NonTerminal::ProgramTail, vec![line, tail])
                    });

                Annotated::void(NonTerminal::Program, vec![first, tail])
            }
        };

        Ok(Program(root))
    }

    /// Analiza una expresión de nivel superior.
    fn line(&self, node: &Node, index: usize) -> Semantic<Annotated> {
        let annotated = self.value(node, index)?;
        trace!(line = index, typ = %annotated.typ, "line analyzed");

        Ok(annotated)
    }

    /// Analiza un nodo aislado como parte de la línea `line` (base cero).
    pub fn analyze_node(&self, node: &Node, line: usize) -> Semantic<Annotated> {
        match node.label() {
            Label::Literal(text) => literal(node, text),
            Label::Operator(operator) => self.binary(node, *operator, line),
            Label::Keyword(Keyword::Res) => self.res(node, line),
            Label::Keyword(Keyword::Mem) => self.mem(node, line),
            Label::Keyword(Keyword::If) => self.condition(node, line),
            Label::Keyword(Keyword::Then) => self.then(node, line),
            Label::Keyword(Keyword::Else) => self.otherwise(node, line),
            Label::Keyword(Keyword::For) => self.repeat(node, line),
            label => Err(fail(node, SemanticError::NoRule(label.clone()))),
        }
    }

    /// Analiza un nodo cuyo resultado se usa como valor.
    ///
    /// `IF` y `THEN` solo pueden aparecer dentro de un `ELSE`.
    fn value(&self, node: &Node, line: usize) -> Semantic<Annotated> {
        if let Label::Keyword(Keyword::If | Keyword::Then) = node.label() {
            return Err(fail(node, SemanticError::IncompleteConditional));
        }

        let annotated = self.analyze_node(node, line)?;
        match annotated.typ {
            Type::Void => Err(fail(node, SemanticError::NotAValue(node.label().clone()))),
            _ => Ok(annotated),
        }
    }

    fn binary(&self, node: &Node, operator: Operator, line: usize) -> Semantic<Annotated> {
        let (left, right) = match node.children() {
            [left, right] => (left, right),
            children => return Err(arity(node, "2", children.len())),
        };

        let mut left_value = self.value(left, line)?;
        let mut right_value = self.value(right, line)?;
        let (left_type, right_type) = (left_value.typ, right_value.typ);

        if !left_type.is_numeric() || !right_type.is_numeric() {
            let error = SemanticError::NotNumeric {
                operator,
                left: left_type,
                right: right_type,
            };

            return Err(fail(node, error));
        }

        let promote = left_type != right_type && operator != Operator::Pow;
        if promote && self.options.contains(CompileOptions::STRICT_TYPES) {
            let error = SemanticError::Incompatible {
                operator,
                left: left_type,
                right: right_type,
            };

            return Err(fail(node, error));
        }

        let right_constant = right_value.value.map(Value::as_f64);
        match operator {
            Operator::Pow if right_type != Type::Int => {
                return Err(fail(right, SemanticError::ExponentNotInt(right_type)));
            }

            Operator::Pow if right_constant.map_or(false, |exponent| exponent < 0.0) => {
                return Err(fail(right, SemanticError::NegativeExponent));
            }

            Operator::Div | Operator::RealDiv | Operator::Mod if right_constant == Some(0.0) => {
                return Err(fail(right, SemanticError::DivisionByZero));
            }

            _ => (),
        }

        let typ = match operator {
            Operator::Div => Type::Int,
            Operator::RealDiv | Operator::Mod => Type::Float,
            Operator::Pow => left_type,
            _ if left_type == Type::Float || right_type == Type::Float => Type::Float,
            _ => Type::Int,
        };

        if promote {
            left_value.needs_cast = left_type == Type::Int;
            right_value.needs_cast = right_type == Type::Int;
        }

        let value = match (left_value.value, right_value.value) {
            (Some(a), Some(b)) => Some(fold(operator, a.as_f64(), b.as_f64(), typ)),
            _ => None,
        };

        let mut annotated = Annotated::from_node(node, vec![left_value, right_value], typ);
        annotated.value = value;

        Ok(annotated)
    }

    fn res(&self, node: &Node, line: usize) -> Semantic<Annotated> {
        let operand = match node.children() {
            [operand] => operand,
            children => return Err(arity(node, "1", children.len())),
        };

        let back = self.value(operand, line)?;
        if back.typ != Type::Int {
            return Err(fail(operand, SemanticError::ResNotInt(back.typ)));
        }

        if let Some(value) = back.value {
            if value.as_f64() <= 0.0 {
                return Err(fail(operand, SemanticError::ResNotPositive));
            } else if value.as_f64() > line as f64 {
                let error = SemanticError::ResOutOfRange {
                    back: value,
                    available: line,
                };

                return Err(fail(operand, error));
            }
        }

        Ok(Annotated::from_node(node, vec![back], Type::Float))
    }

    fn mem(&self, node: &Node, line: usize) -> Semantic<Annotated> {
        match node.children() {
            [] => Ok(Annotated::from_node(node, Vec::new(), Type::Float)),

            [operand] => {
                let stored = self.value(operand, line)?;
                if !stored.typ.is_numeric() {
                    return Err(fail(operand, SemanticError::MemNotNumeric(stored.typ)));
                }

                let typ = stored.typ;
                Ok(Annotated::from_node(node, vec![stored], typ))
            }

            children => Err(arity(node, "0 or 1", children.len())),
        }
    }

    fn condition(&self, node: &Node, line: usize) -> Semantic<Annotated> {
        let operand = match node.children() {
            [operand] => operand,
            children => return Err(arity(node, "1", children.len())),
        };

        let condition = self.value(operand, line)?;
        if !condition.typ.is_numeric() {
            return Err(fail(operand, SemanticError::ConditionNotNumeric(condition.typ)));
        }

        Ok(Annotated::from_node(node, vec![condition], Type::Void))
    }

    fn then(&self, node: &Node, line: usize) -> Semantic<Annotated> {
        let (condition, body) = match node.children() {
            [condition, body] => (condition, body),
            children => return Err(arity(node, "2", children.len())),
        };

        if condition.label() != &Label::Keyword(Keyword::If) {
            return Err(fail(condition, SemanticError::ExpectedIf(condition.label().clone())));
        }

        let condition = self.analyze_node(condition, line)?;
        let body = self.value(body, line)?;

        let typ = body.typ;
        Ok(Annotated::from_node(node, vec![condition, body], typ))
    }

    fn otherwise(&self, node: &Node, line: usize) -> Semantic<Annotated> {
        let (then, otherwise) = match node.children() {
            [then, otherwise] => (then, otherwise),
            children => return Err(arity(node, "2", children.len())),
        };

        if then.label() != &Label::Keyword(Keyword::Then) {
            return Err(fail(then, SemanticError::ExpectedThen(then.label().clone())));
        }

        let then = self.analyze_node(then, line)?;
        let otherwise = self.value(otherwise, line)?;

        if then.typ != otherwise.typ {
            let error = SemanticError::BranchMismatch {
                then: then.typ,
                otherwise: otherwise.typ,
            };

            return Err(fail(node, error));
        }

        let typ = then.typ;
        Ok(Annotated::from_node(node, vec![then, otherwise], typ))
    }

    fn repeat(&self, node: &Node, line: usize) -> Semantic<Annotated> {
        let (count, body) = match node.children() {
            [count, body] => (count, body),
            children => return Err(arity(node, "2", children.len())),
        };

        let iterations = self.value(count, line)?;
        if iterations.typ != Type::Int {
            return Err(fail(count, SemanticError::LoopCount(iterations.typ)));
        } else if iterations.value.map_or(false, |value| value.as_f64() < 0.0) {
            return Err(fail(count, SemanticError::NegativeLoopCount));
        }

        let body = self.value(body, line)?;

        let typ = body.typ;
        Ok(Annotated::from_node(node, vec![iterations, body], typ))
    }
}

fn literal(node: &Node, text: &str) -> Semantic<Annotated> {
    let (typ, value) = if text.contains('.') {
        let value = text
            .parse()
            .map_err(|_| fail(node, SemanticError::BadLiteral(text.to_owned())))?;

        (Type::Float, Value::Float(value))
    } else {
        let value = text
            .parse()
            .map_err(|_| fail(node, SemanticError::IntegerOutOfRange(text.to_owned())))?;

        (Type::Int, Value::Int(value))
    };

    let mut annotated = Annotated::from_node(node, Vec::new(), typ);
    annotated.sign = Sign::of(value.as_f64());
    annotated.value = Some(value);

    Ok(annotated)
}

/// Evalúa un operador con aritmética real.
fn fold(operator: Operator, a: f64, b: f64, typ: Type) -> Value {
    let result = match operator {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mul => a * b,
        Operator::Div => (a / b).trunc(),
        Operator::RealDiv => a / b,
        Operator::Mod => a % b,
        Operator::Pow => a.powf(b),
    };

    Value::from_real(result, typ)
}

fn fail(node: &Node, error: SemanticError) -> Located<SemanticError> {
    let location = node.location().cloned().unwrap_or_else(Location::unknown);
    Located::at(error, location)
}

fn arity(node: &Node, expected: &'static str, found: usize) -> Located<SemanticError> {
    let error = SemanticError::Arity {
        operator: node.label().clone(),
        expected,
        found,
    };

    fail(node, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, parse::ParserOptions, source};

    fn lit(text: &str) -> Node {
        Node::literal(text)
    }

    fn op(operator: Operator, left: Node, right: Node) -> Node {
        Node::new(Label::Operator(operator), vec![left, right])
    }

    fn kw(keyword: Keyword, children: Vec<Node>) -> Node {
        Node::new(Label::Keyword(keyword), children)
    }

    fn analyze(node: &Node) -> Semantic<Annotated> {
        Analyzer::new(CompileOptions::empty()).analyze_node(node, 0)
    }

    fn message(result: Semantic<Annotated>) -> String {
        result.unwrap_err().val().to_string()
    }

    fn program(text: &str, options: CompileOptions) -> Semantic<Program> {
        let (start, stream) = source::consume(text.as_bytes(), "test");
        let tokens = Lexer::new(start, stream).tokenize().unwrap();
        let ast = parse::parse(&tokens, ParserOptions::default()).unwrap();

        Analyzer::new(options).analyze(&ast)
    }

    #[test]
    fn literals_carry_type_and_sign() {
        let int = analyze(&lit("123")).unwrap();
        assert_eq!((int.typ(), int.sign()), (Type::Int, Sign::Positive));
        assert_eq!(int.value(), Some(Value::Int(123)));

        let float = analyze(&lit("-10.5")).unwrap();
        assert_eq!((float.typ(), float.sign()), (Type::Float, Sign::Negative));

        let zero = analyze(&lit("0")).unwrap();
        assert_eq!((zero.typ(), zero.sign()), (Type::Int, Sign::Zero));
    }

    #[test]
    fn oversized_integer_literal() {
        let result = analyze(&lit("99999999999999999999"));
        assert_eq!(message(result), "Integer literal out of range");
    }

    #[test]
    fn integer_arithmetic_is_folded() {
        let sum = analyze(&op(Operator::Add, lit("5"), lit("3"))).unwrap();

        assert_eq!(sum.typ(), Type::Int);
        assert_eq!(sum.sign(), Sign::Unknown);
        assert_eq!(sum.value(), Some(Value::Int(8)));
    }

    #[test]
    fn float_arithmetic() {
        let product = analyze(&op(Operator::Mul, lit("2.5"), lit("4.0"))).unwrap();
        assert_eq!(product.typ(), Type::Float);
        assert_eq!(product.value(), Some(Value::Float(10.0)));
    }

    #[test]
    fn mixed_operands_are_promoted() {
        let difference = analyze(&op(Operator::Sub, lit("10"), lit("0.5"))).unwrap();

        assert_eq!(difference.typ(), Type::Float);
        assert!(difference.children()[0].needs_cast());
        assert!(!difference.children()[1].needs_cast());
        assert_eq!(difference.value(), Some(Value::Float(9.5)));
    }

    #[test]
    fn strict_mode_rejects_mixed_operands() {
        let analyzer = Analyzer::new(CompileOptions::STRICT_TYPES);
        let result = analyzer.analyze_node(&op(Operator::Add, lit("1"), lit("2.0")), 0);

        assert_eq!(
            message(result),
            "Incompatible types for '+': INT and FLOAT (automatic promotion disabled)"
        );
    }

    #[test]
    fn division_operators_have_fixed_result_types() {
        let quotient = analyze(&op(Operator::Div, lit("7.5"), lit("2"))).unwrap();
        assert_eq!(quotient.typ(), Type::Int);
        assert_eq!(quotient.value(), Some(Value::Int(3)));

        let negative = analyze(&op(Operator::Div, lit("-7"), lit("2"))).unwrap();
        assert_eq!(negative.value(), Some(Value::Int(-3)));

        let real = analyze(&op(Operator::RealDiv, lit("7"), lit("2"))).unwrap();
        assert_eq!(real.typ(), Type::Float);
        assert_eq!(real.value(), Some(Value::Float(3.5)));

        let remainder = analyze(&op(Operator::Mod, lit("-7"), lit("2"))).unwrap();
        assert_eq!(remainder.typ(), Type::Float);
        assert_eq!(remainder.value(), Some(Value::Float(-1.0)));
    }

    #[test]
    fn division_by_literal_zero() {
        for operator in [Operator::Div, Operator::RealDiv, Operator::Mod] {
            let result = analyze(&op(operator, lit("100"), lit("0")));
            assert_eq!(message(result), "Division by literal zero");

            let strict = Analyzer::new(CompileOptions::STRICT_TYPES);
            let result = strict.analyze_node(&op(operator, lit("100"), lit("0")), 0);
            assert_eq!(message(result), "Division by literal zero");
        }
    }

    #[test]
    fn folded_zero_divisor() {
        let divisor = op(Operator::Sub, lit("2"), lit("2"));
        let result = analyze(&op(Operator::Div, lit("1"), divisor));
        assert_eq!(message(result), "Division by literal zero");
    }

    #[test]
    fn exponent_rules() {
        let result = analyze(&op(Operator::Pow, lit("10"), lit("2.0")));
        assert_eq!(message(result), "The exponent ('^') must be an INT, but got FLOAT");

        let result = analyze(&op(Operator::Pow, lit("10"), lit("-2")));
        assert_eq!(message(result), "The exponent ('^') must be a non-negative integer");

        let power = analyze(&op(Operator::Pow, lit("1.5"), lit("2"))).unwrap();
        assert_eq!(power.typ(), Type::Float);
        assert!(!power.children()[1].needs_cast());
        assert_eq!(power.value(), Some(Value::Float(2.25)));

        let strict = Analyzer::new(CompileOptions::STRICT_TYPES);
        assert!(strict
            .analyze_node(&op(Operator::Pow, lit("1.5"), lit("2")), 0)
            .is_ok());
    }

    #[test]
    fn res_within_bounds() {
        let node = kw(Keyword::Res, vec![lit("1")]);
        let result = Analyzer::new(CompileOptions::empty())
            .analyze_node(&node, 1)
            .unwrap();

        assert_eq!(result.typ(), Type::Float);
        assert_eq!(result.sign(), Sign::Unknown);
        assert_eq!(result.value(), None);
    }

    #[test]
    fn res_out_of_bounds() {
        let node = kw(Keyword::Res, vec![lit("3")]);
        let result = Analyzer::new(CompileOptions::empty()).analyze_node(&node, 1);

        assert_eq!(
            message(result),
            "Cannot 'RES' 3 lines back. Only 1 previous result(s) are available."
        );
    }

    #[test]
    fn res_operand_rules() {
        let result = analyze(&kw(Keyword::Res, vec![lit("1.0")]));
        assert_eq!(message(result), "'RES' expects an INT operand, but received FLOAT");

        let result = analyze(&kw(Keyword::Res, vec![lit("0")]));
        assert_eq!(message(result), "'RES' operand must be a positive integer");
    }

    #[test]
    fn mem_read_and_write() {
        let read = analyze(&kw(Keyword::Mem, Vec::new())).unwrap();
        assert_eq!(read.typ(), Type::Float);

        let write = analyze(&kw(Keyword::Mem, vec![lit("4")])).unwrap();
        assert_eq!(write.typ(), Type::Int);
        assert_eq!(write.value(), None);
    }

    #[test]
    fn for_loop_takes_body_type() {
        let node = kw(Keyword::For, vec![lit("5"), lit("10.0")]);
        assert_eq!(analyze(&node).unwrap().typ(), Type::Float);
    }

    #[test]
    fn for_loop_count_rules() {
        let result = analyze(&kw(Keyword::For, vec![lit("5.0"), lit("10")]));
        assert_eq!(message(result), "The loop count for 'FOR' must be an INT");

        let result = analyze(&kw(Keyword::For, vec![lit("-1"), lit("10")]));
        assert_eq!(message(result), "The loop count for 'FOR' must not be negative");
    }

    fn conditional(then: Node, otherwise: Node) -> Node {
        let condition = kw(Keyword::If, vec![lit("1")]);
        let then = kw(Keyword::Then, vec![condition, then]);

        kw(Keyword::Else, vec![then, otherwise])
    }

    #[test]
    fn if_then_else_type() {
        let node = conditional(lit("10"), lit("20"));
        let result = analyze(&node).unwrap();

        assert_eq!(result.typ(), Type::Int);
        assert_eq!(result.children()[0].children()[0].typ(), Type::Void);
    }

    #[test]
    fn mismatched_branches_are_rejected() {
        for options in [CompileOptions::empty(), CompileOptions::STRICT_TYPES] {
            let node = conditional(lit("10"), lit("20.0"));
            let result = Analyzer::new(options).analyze_node(&node, 0);

            assert_eq!(message(result), "Incompatible types in conditional branches");
        }
    }

    #[test]
    fn then_requires_if() {
        let node = kw(Keyword::Else, vec![kw(Keyword::Then, vec![lit("1"), lit("2")]), lit("3")]);
        assert_eq!(
            message(analyze(&node)),
            "The first operand for 'THEN' must be 'IF', but got '1'"
        );
    }

    #[test]
    fn incomplete_conditional_line() {
        let then = kw(Keyword::Then, vec![kw(Keyword::If, vec![lit("1")]), lit("10")]);
        let tail = Node::new(Label::NonTerminal(NonTerminal::ProgramTail), Vec::new());
        let root = Node::new(Label::NonTerminal(NonTerminal::Program), vec![then, tail]);

        let result = Analyzer::new(CompileOptions::empty()).analyze(&Ast::new(root));
        assert_eq!(result.unwrap_err().val().to_string(), "Incomplete conditional");

        let result = program("(1 IF)", CompileOptions::empty());
        assert_eq!(result.unwrap_err().val().to_string(), "Incomplete conditional");
    }

    #[test]
    fn conditional_cannot_be_an_operand() {
        let result = program("((1 IF) 2 +)", CompileOptions::empty());
        let error = result.unwrap_err();

        assert_eq!(error.val().to_string(), "Incomplete conditional");
        assert_eq!(error.location().start().column(), 5);
    }

    #[test]
    fn res_counts_previous_lines() {
        assert!(program("(1 2 +)\n(1 RES)", CompileOptions::empty()).is_ok());

        let error = program("(5 RES)", CompileOptions::empty()).unwrap_err();
        assert_eq!(
            error.val().to_string(),
            "Cannot 'RES' 5 lines back. Only 0 previous result(s) are available."
        );
        assert_eq!(error.location().start().column(), 2);
    }

    #[test]
    fn program_shape_is_preserved() {
        let program = program("(1 2 +)\n(2.5 MEM)\n(MEM)", CompileOptions::empty()).unwrap();
        let types: Vec<_> = program.lines().iter().map(|line| line.typ()).collect();

        assert_eq!(types, vec![Type::Int, Type::Float, Type::Float]);
        assert_eq!(
            program.root().to_string(),
            "<program>: VOID(+: INT(1: INT, 2: INT), <program_tail>: VOID(MEM: FLOAT(2.5: FLOAT), \
             <program_tail>: VOID(MEM: FLOAT, <program_tail>: VOID)))"
        );
    }

    #[test]
    fn grouped_loop_is_float() {
        let program = program("(10 (0.5) FOR)", CompileOptions::empty()).unwrap();
        assert_eq!(program.lines()[0].typ(), Type::Float);
    }
}
