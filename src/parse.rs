//! Análisis sintáctico.
//!
//! # Algoritmo
//! El parser es LL(1) y está dirigido por una tabla: no existe una función
//! por regla gramatical. Una sola pila de [`Symbol`] contiene terminales
//! por emparejar, no terminales por expandir y marcadores de construcción.
//! Cuando un marcador llega a la cima, los subárboles que produjo su
//! regla se desapilan de una segunda pila y se combinan en un [`Node`].
//!
//! # Forma del árbol
//! El árbol resultante no es un árbol de derivación. Los paréntesis y las
//! reglas de paso desaparecen, y los operadores se convierten en nodos
//! cuyos hijos son sus operandos: `(1 2 +)` resulta en `+(1, 2)`. Solo
//! `<program>`, `<program_tail>` y `<rpn_tail>` sobreviven como nodos
//! no terminales.
//!
//! # Errores
//! No hay recuperación. El primer token inesperado detiene el análisis.

use std::fmt::{self, Display};

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    lex::{Keyword, Operator, Token, TokenKind},
    source::{Located, Location},
};

/// Profundidad máxima por omisión de la pila de símbolos.
pub const DEFAULT_MAX_DEPTH: usize = 4096;

/// Error de análisis sintáctico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {expected}, found {found}")]
    UnexpectedToken {
        expected: TokenKind,
        found: TokenKind,
    },

    #[error("Unexpected {found}; expected one of: {}", join(.expected))]
    NoProduction {
        found: TokenKind,
        expected: Vec<TokenKind>,
    },

    #[error("Expression nesting too deep")]
    TooDeep(usize),

    #[error("AST construction failed")]
    Internal(&'static str),
}

fn join(kinds: &[TokenKind]) -> String {
    let names: Vec<_> = kinds.iter().map(TokenKind::to_string).collect();
    names.join(", ")
}

/// Opciones de análisis sintáctico.
#[derive(Copy, Clone, Debug)]
pub struct ParserOptions {
    /// Límite de símbolos simultáneos en la pila.
    pub max_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Símbolos no terminales de la gramática.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NonTerminal {
    Program,
    Expr,
    Rpn,
    RpnTail,
    Operand,
    OpUnary,
    OpBinary,
    ProgramTail,
}

impl Display for NonTerminal {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use NonTerminal::*;

        let name = match self {
            Program => "<program>",
            Expr => "<expr>",
            Rpn => "<rpn>",
            RpnTail => "<rpn_tail>",
            Operand => "<operand>",
            OpUnary => "<op_unary>",
            OpBinary => "<op_binary>",
            ProgramTail => "<program_tail>",
        };

        fmt.write_str(name)
    }
}

/// Marcador de construcción de un subárbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Build {
    lhs: NonTerminal,
    arity: usize,
    production: usize,
}

/// Elemento de la pila de análisis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Symbol {
    Terminal(TokenKind),
    NonTerminal(NonTerminal),
    Build(Build),
}

/// Una regla gramatical.
struct Production {
    id: usize,
    lhs: NonTerminal,
    rhs: &'static [Symbol],
}

use NonTerminal as N;
use Symbol::{NonTerminal as Nt, Terminal as T};

const PRODUCTIONS: &[Production] = &[
    Production {
        id: 1,
        lhs: N::Program,
        rhs: &[Nt(N::Expr), Nt(N::ProgramTail)],
    },
    Production {
        id: 2,
        lhs: N::Expr,
        rhs: &[
            T(TokenKind::OpenParen),
            Nt(N::Rpn),
            T(TokenKind::CloseParen),
        ],
    },
    Production {
        id: 3,
        lhs: N::Rpn,
        rhs: &[T(TokenKind::Keyword(Keyword::Mem))],
    },
    Production {
        id: 4,
        lhs: N::Rpn,
        rhs: &[Nt(N::Operand), Nt(N::RpnTail)],
    },
    Production {
        id: 5,
        lhs: N::RpnTail,
        rhs: &[Nt(N::OpUnary)],
    },
    Production {
        id: 6,
        lhs: N::RpnTail,
        rhs: &[Nt(N::Operand), Nt(N::OpBinary)],
    },
    Production {
        id: 7,
        lhs: N::Operand,
        rhs: &[T(TokenKind::Int)],
    },
    Production {
        id: 8,
        lhs: N::Operand,
        rhs: &[T(TokenKind::Float)],
    },
    Production {
        id: 9,
        lhs: N::Operand,
        rhs: &[Nt(N::Expr)],
    },
    Production {
        id: 10,
        lhs: N::OpUnary,
        rhs: &[T(TokenKind::Keyword(Keyword::Mem))],
    },
    Production {
        id: 11,
        lhs: N::OpUnary,
        rhs: &[T(TokenKind::Keyword(Keyword::Res))],
    },
    Production {
        id: 12,
        lhs: N::OpUnary,
        rhs: &[T(TokenKind::Keyword(Keyword::If))],
    },
    Production {
        id: 13,
        lhs: N::OpBinary,
        rhs: &[T(TokenKind::Keyword(Keyword::Then))],
    },
    Production {
        id: 14,
        lhs: N::OpBinary,
        rhs: &[T(TokenKind::Keyword(Keyword::Else))],
    },
    Production {
        id: 15,
        lhs: N::OpBinary,
        rhs: &[T(TokenKind::Keyword(Keyword::For))],
    },
    Production {
        id: 16,
        lhs: N::OpBinary,
        rhs: &[T(TokenKind::Operator)],
    },
    Production {
        id: 17,
        lhs: N::ProgramTail,
        rhs: &[Nt(N::Expr), Nt(N::ProgramTail)],
    },
    Production {
        id: 18,
        lhs: N::ProgramTail,
        rhs: &[],
    },
    Production {
        id: 19,
        lhs: N::RpnTail,
        rhs: &[],
    },
];

/// Tabla LL(1): `(no terminal, lookahead) → producción`.
///
/// El orden de las entradas determina el orden de las alternativas
/// que se listan en un error.
const TABLE: &[(NonTerminal, TokenKind, usize)] = &[
    (N::Program, TokenKind::OpenParen, 1),
    (N::Expr, TokenKind::OpenParen, 2),
    (N::Rpn, TokenKind::Keyword(Keyword::Mem), 3),
    (N::Rpn, TokenKind::Int, 4),
    (N::Rpn, TokenKind::Float, 4),
    (N::Rpn, TokenKind::OpenParen, 4),
    (N::RpnTail, TokenKind::Keyword(Keyword::Mem), 5),
    (N::RpnTail, TokenKind::Keyword(Keyword::Res), 5),
    (N::RpnTail, TokenKind::Keyword(Keyword::If), 5),
    (N::RpnTail, TokenKind::Int, 6),
    (N::RpnTail, TokenKind::Float, 6),
    (N::RpnTail, TokenKind::OpenParen, 6),
    (N::RpnTail, TokenKind::CloseParen, 19),
    (N::Operand, TokenKind::Int, 7),
    (N::Operand, TokenKind::Float, 8),
    (N::Operand, TokenKind::OpenParen, 9),
    (N::OpUnary, TokenKind::Keyword(Keyword::Mem), 10),
    (N::OpUnary, TokenKind::Keyword(Keyword::Res), 11),
    (N::OpUnary, TokenKind::Keyword(Keyword::If), 12),
    (N::OpBinary, TokenKind::Keyword(Keyword::Then), 13),
    (N::OpBinary, TokenKind::Keyword(Keyword::Else), 14),
    (N::OpBinary, TokenKind::Keyword(Keyword::For), 15),
    (N::OpBinary, TokenKind::Operator, 16),
    (N::ProgramTail, TokenKind::OpenParen, 17),
    (N::ProgramTail, TokenKind::Eof, 18),
];

fn lookup(lhs: NonTerminal, kind: TokenKind) -> Option<&'static Production> {
    let id = TABLE
        .iter()
        .find(|&&(nt, lookahead, _)| nt == lhs && lookahead == kind)
        .map(|&(_, _, id)| id)?;

    PRODUCTIONS.iter().find(|production| production.id == id)
}

fn admissible(lhs: NonTerminal) -> Vec<TokenKind> {
    TABLE
        .iter()
        .filter(|&&(nt, _, _)| nt == lhs)
        .map(|&(_, kind, _)| kind)
        .collect()
}

/// Etiqueta de un nodo del árbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Label {
    /// Un nodo que agrupa por regla gramatical.
    NonTerminal(NonTerminal),

    /// Texto de una constante numérica, tal como se escribió.
    Literal(String),

    /// Operador aritmético.
    Operator(Operator),

    /// Palabra clave, ya sea como operador o como `(MEM)`.
    Keyword(Keyword),

    /// Paréntesis. Nunca sobreviven a la construcción del árbol.
    Delimiter(String),
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::NonTerminal(nt) => write!(fmt, "{}", nt),
            Label::Literal(text) | Label::Delimiter(text) => fmt.write_str(text),
            Label::Operator(operator) => write!(fmt, "{}", operator),
            Label::Keyword(keyword) => write!(fmt, "{}", keyword),
        }
    }
}

/// Nodo del árbol de sintaxis abstracta.
#[derive(Clone, Debug)]
pub struct Node {
    label: Label,
    children: Vec<Node>,
    token: Option<Located<Token>>,
}

impl Node {
    /// Construye un nodo sin token de origen.
    pub fn new(label: Label, children: Vec<Node>) -> Self {
        Node {
            label,
            children,
            token: None,
        }
    }

    /// Construye una constante sin token de origen.
    pub fn literal<S: Into<String>>(text: S) -> Self {
        Node::new(Label::Literal(text.into()), Vec::new())
    }

    /// Construye una hoja a partir de un token.
    ///
    /// El token de fin de entrada no tiene hoja.
    pub fn leaf(token: Located<Token>) -> Option<Self> {
        let lexeme = token.val().lexeme();
        let label = match token.val().kind() {
            TokenKind::Int | TokenKind::Float => Label::Literal(lexeme.to_owned()),
            TokenKind::Operator => Label::Operator(lexeme.parse().ok()?),
            TokenKind::Keyword(keyword) => Label::Keyword(keyword),
            TokenKind::OpenParen | TokenKind::CloseParen => Label::Delimiter(lexeme.to_owned()),
            TokenKind::Eof => return None,
        };

        Some(Node {
            label,
            children: Vec::new(),
            token: Some(token),
        })
    }

    /// Asocia un token de origen.
    pub fn with_token(self, token: Located<Token>) -> Self {
        Node {
            token: Some(token),
            ..self
        }
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn token(&self) -> Option<&Located<Token>> {
        self.token.as_ref()
    }

    /// Ubicación del token de origen, si existe.
    pub fn location(&self) -> Option<&Location> {
        self.token.as_ref().map(Located::location)
    }
}

impl Display for Node {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.label)?;
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

/// Resultado del análisis sintáctico.
#[derive(Clone, Debug)]
pub struct Ast(Node);

impl Ast {
    /// Construye a partir de un nodo raíz `<program>`.
    pub fn new(root: Node) -> Self {
        Ast(root)
    }

    pub fn root(&self) -> &Node {
        &self.0
    }

    /// Expresiones de nivel superior, una por línea de programa.
    pub fn lines(&self) -> Vec<&Node> {
        program_lines(&self.0, Node::children)
    }
}

/// Aplana la cadena `<program>`/`<program_tail>` en una lista de líneas.
pub(crate) fn program_lines<'a, T, F>(root: &'a T, children: F) -> Vec<&'a T>
where
    F: Fn(&'a T) -> &'a [T],
{
    let mut lines = Vec::new();
    let mut current = children(root);

    while let [line, tail] = current {
        lines.push(line);
        current = children(tail);
    }

    lines
}

/// Construye un árbol a partir de un flujo completo de tokens.
///
/// Si el flujo no termina en [`TokenKind::Eof`] se asume uno
/// inmediatamente después del último token.
pub fn parse(tokens: &[Located<Token>], options: ParserOptions) -> Result<Ast, Located<ParserError>> {
    let eof_location = tokens
        .last()
        .map(|token| token.location().clone())
        .unwrap_or_else(Location::unknown);

    let eof = Located::at(Token::eof(), eof_location);

    let mut symbols = vec![T(TokenKind::Eof), Nt(N::Program)];
    let mut nodes: Vec<Node> = Vec::new();
    let mut position = 0;

    // Marcadores de líneas anteriores, no cuentan como anidamiento
    let mut pending_lines = 0;

    while let Some(symbol) = symbols.pop() {
        let lookahead = tokens.get(position).unwrap_or(&eof);
        let found = lookahead.val().kind();
        let fail = |error| Err(Located::at(error, lookahead.location().clone()));

        match symbol {
            Symbol::Build(build) => {
                if build.lhs == N::ProgramTail {
                    pending_lines -= 1;
                }

                let children = match nodes.len().checked_sub(build.arity) {
                    Some(at) => nodes.split_off(at),
                    None => return fail(ParserError::Internal("missing subtrees")),
                };

                match reduce(build, children) {
                    Some(node) => nodes.push(node),
                    None => return fail(ParserError::Internal("malformed production")),
                }
            }

            Symbol::Terminal(expected) if expected != found => {
                return fail(ParserError::UnexpectedToken { expected, found });
            }

            Symbol::Terminal(_) => {
                position += 1;
                if let Some(leaf) = Node::leaf(lookahead.clone()) {
                    nodes.push(leaf);
                }
            }

            Symbol::NonTerminal(lhs) => {
                let production = match lookup(lhs, found) {
                    Some(production) => production,
                    None => {
                        let expected = admissible(lhs);
                        return fail(ParserError::NoProduction { found, expected });
                    }
                };

                trace!(%lhs, %found, production = production.id, "expand");

                symbols.push(Symbol::Build(Build {
                    lhs: production.lhs,
                    arity: production.rhs.len(),
                    production: production.id,
                }));

                if production.lhs == N::ProgramTail {
                    pending_lines += 1;
                }

                symbols.extend(production.rhs.iter().rev().copied());
                if symbols.len() - pending_lines > options.max_depth {
                    return fail(ParserError::TooDeep(options.max_depth));
                }
            }
        }
    }

    match (nodes.pop(), nodes.is_empty()) {
        (Some(root), true) => {
            let ast = Ast(root);
            debug!(lines = ast.lines().len(), "syntax analysis finished");

            Ok(ast)
        }

        _ => Err(Located::at(
            ParserError::Internal("unbalanced stack"),
            eof.location().clone(),
        )),
    }
}

/// Da forma al subárbol de una producción recién completada.
fn reduce(build: Build, mut children: Vec<Node>) -> Option<Node> {
    match build.production {
        // <expr> → L_PAREN <rpn> R_PAREN
        2 => children.into_iter().nth(1),

        // <rpn> → <operand> <rpn_tail>
        4 => {
            let tail = children.pop()?;
            let operand = children.pop()?;

            match tail.label {
                Label::NonTerminal(N::RpnTail) => {
                    let mut tail_children = tail.children;
                    match tail_children.pop() {
                        None => Some(operand),
                        Some(operator) => {
                            let second = tail_children.pop()?;
                            Some(Node {
                                label: operator.label,
                                children: vec![operand, second],
                                token: operator.token,
                            })
                        }
                    }
                }

                _ => Some(Node {
                    children: vec![operand],
                    ..tail
                }),
            }
        }

        1 | 6 | 17 | 18 | 19 => Some(Node::new(Label::NonTerminal(build.lhs), children)),

        // Reglas de paso
        _ => {
            let single = children.pop()?;
            children.is_empty().then(|| single)
        }
    }
}
