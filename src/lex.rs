//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco se descartan durante esta operación. Cada token emitido está
//! asociado a una ubicación en el código fuente original, lo cual permite
//! rastrear errores tanto en los tokens mismos como en constructos más
//! elevados de fases posteriores.
//!
//! # Autómata
//! El lexer es un autómata finito determinista explícito. Cada carácter de
//! entrada se clasifica primero en una [`Category`]; la función de transición
//! se consulta con la categoría y, en su defecto, con el carácter en
//! mayúscula, lo cual permite deletrear palabras clave. Cuando no existe
//! transición y el estado actual es de aceptación se emite un token sin
//! consumir el carácter que detuvo al autómata.
//!
//! # Contenido de un token
//! A diferencia de otras fases, todo token preserva su lexema original.
//! Concatenar los lexemas de un flujo reconstruye la entrada sin espacios.
//!
//! # Reglas importantes del lenguaje
//! - Las palabras clave son case-insensitive: `res`, `Res` y `RES`
//!   resultan en [`Keyword::Res`].
//! - Un `-` seguido de un dígito inicia una constante negativa.
//! - Los espacios en blanco solo se descartan entre tokens.
//!
//! # Errores
//! El lexer no se recupera de errores. Luego del primer error el flujo
//! termina.

use crate::source::{InputStream, Located, Location};
use std::{
    fmt::{self, Display},
    iter::Peekable,
    mem,
    str::FromStr,
};

use thiserror::Error;
use tracing::debug;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Error de E/S originado por el [`InputStream`].
    #[error("I/O error")]
    Input(#[from] std::io::Error),

    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Unexpected character: {0:?}")]
    BadChar(char),

    /// La entrada terminó a media construcción de un token.
    #[error("Incomplete lexeme")]
    Incomplete(String),
}

/// Clase de token.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// Literal entero, posiblemente negativo.
    Int,

    /// Literal de punto flotante, posiblemente negativo.
    Float,

    /// Uno de `+ - * / | % ^`.
    Operator,

    /// Palabra clave.
    Keyword(Keyword),

    /// Fin de la entrada.
    Eof,
}

impl Display for TokenKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::{CloseParen, Eof, Float, Int, OpenParen, Operator};

        match self {
            OpenParen => fmt.write_str("L_PAREN"),
            CloseParen => fmt.write_str("R_PAREN"),
            Int => fmt.write_str("NUM_INT"),
            Float => fmt.write_str("NUM_FLOAT"),
            Operator => fmt.write_str("ARITHMETIC_OP"),
            TokenKind::Keyword(keyword) => write!(fmt, "KW_{}", keyword),
            Eof => fmt.write_str("EOF"),
        }
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    lexeme: String,
}

impl Token {
    /// Construye un token a partir de su clase y lexema.
    pub fn new<S: Into<String>>(kind: TokenKind, lexeme: S) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
        }
    }

    /// Token sintético de fin de entrada.
    pub fn eof() -> Self {
        Token::new(TokenKind::Eof, "")
    }

    /// Obtiene la clase.
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Obtiene el lexema original.
    pub fn lexeme(&self) -> &str {
        &self.lexeme
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "<{} {:?}>", self.kind, self.lexeme)
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    Mem,
    Res,
    If,
    Then,
    Else,
    For,
}

/// Palabras clave en su forma canónica.
const KEYWORDS: &[(&str, Keyword)] = &[
    ("MEM", Keyword::Mem),
    ("RES", Keyword::Res),
    ("IF", Keyword::If),
    ("THEN", Keyword::Then),
    ("ELSE", Keyword::Else),
    ("FOR", Keyword::For),
];

impl Keyword {
    /// Forma canónica, en mayúsculas.
    pub fn spelling(self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|&&(_, keyword)| keyword == self)
            .map(|&(spelling, _)| spelling)
            .unwrap_or_default()
    }
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.spelling())
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| NoCase::new(name) == NoCase::new(string))
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Operador aritmético binario.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `+`
    Add,

    /// `-`
    Sub,

    /// `*`
    Mul,

    /// `/`, división entera truncada.
    Div,

    /// `|`, división real.
    RealDiv,

    /// `%`
    Mod,

    /// `^`
    Pow,
}

impl Display for Operator {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Operator::*;

        let symbol = match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            RealDiv => "|",
            Mod => "%",
            Pow => "^",
        };

        fmt.write_str(symbol)
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Operator::*;

        match string {
            "+" => Ok(Add),
            "-" => Ok(Sub),
            "*" => Ok(Mul),
            "/" => Ok(Div),
            "|" => Ok(RealDiv),
            "%" => Ok(Mod),
            "^" => Ok(Pow),
            _ => Err(()),
        }
    }
}

/// Categoría de un carácter de entrada.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Category {
    OpenParen,
    CloseParen,
    Digit,
    Dot,
    Minus,
    Operator,
    Space,
    Eof,
    Other,
}

/// Clasifica un carácter antes de consultar la tabla de transiciones.
pub fn classify(c: Option<char>) -> Category {
    match c {
        None => Category::Eof,
        Some('(') => Category::OpenParen,
        Some(')') => Category::CloseParen,
        Some('.') => Category::Dot,
        Some('-') => Category::Minus,
        Some('+' | '*' | '/' | '|' | '%' | '^') => Category::Operator,
        Some(' ' | '\t' | '\n' | '\r') => Category::Space,
        Some(c) if c.is_ascii_digit() => Category::Digit,
        Some(_) => Category::Other,
    }
}

/// Posibles estados del autómata.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Se encontró `(`.
    OpenParen,

    /// Se encontró `)`.
    CloseParen,

    /// Dígitos de una constante entera.
    Integer,

    /// Punto decimal, debe seguir al menos un dígito.
    Point,

    /// Dígitos de la parte fraccionaria.
    Fraction,

    /// Un `-`, que puede ser operador o signo.
    Minus,

    /// Cualquier otro operador.
    Operator,

    /// Cadena de deletreo de una palabra clave. `matched` cuenta los
    /// caracteres ya reconocidos de `spelling`.
    Spelling {
        spelling: &'static str,
        matched: usize,
    },
}

impl State {
    /// Clase de token que se emite al detenerse en este estado, si alguna.
    fn accepts(self) -> Option<TokenKind> {
        match self {
            State::OpenParen => Some(TokenKind::OpenParen),
            State::CloseParen => Some(TokenKind::CloseParen),
            State::Integer => Some(TokenKind::Int),
            State::Fraction => Some(TokenKind::Float),
            State::Minus | State::Operator => Some(TokenKind::Operator),

            State::Spelling { spelling, matched } if matched == spelling.len() => {
                spelling.parse().ok().map(TokenKind::Keyword)
            }

            _ => None,
        }
    }
}

/// Función de transición.
///
/// Las transiciones por categoría tienen precedencia; solo si no existe
/// una se intenta con el carácter en mayúscula.
fn transition(state: State, c: char) -> Option<State> {
    use State::*;

    let by_category = match (state, classify(Some(c))) {
        (Start, Category::OpenParen) => Some(OpenParen),
        (Start, Category::CloseParen) => Some(CloseParen),

        // Constantes numéricas
        (Start, Category::Digit) => Some(Integer),
        (Integer, Category::Digit) => Some(Integer),
        (Integer, Category::Dot) => Some(Point),
        (Point, Category::Digit) => Some(Fraction),
        (Fraction, Category::Digit) => Some(Fraction),

        // Operadores, `-` puede continuar como signo de una constante
        (Start, Category::Minus) => Some(Minus),
        (Minus, Category::Digit) => Some(Integer),
        (Start, Category::Operator) => Some(Operator),

        _ => None,
    };

    by_category.or_else(|| spell(state, c.to_ascii_uppercase()))
}

/// Transiciones sobre caracteres literales para las palabras clave.
fn spell(state: State, upper: char) -> Option<State> {
    let (spelling, matched) = match state {
        State::Start => KEYWORDS
            .iter()
            .map(|&(spelling, _)| spelling)
            .find(|spelling| spelling.starts_with(upper))
            .map(|spelling| (spelling, 0))?,

        State::Spelling { spelling, matched } => (spelling, matched),
        _ => return None,
    };

    let expected = spelling[matched..].chars().next()?;
    (expected == upper).then(|| State::Spelling {
        spelling,
        matched: matched + 1,
    })
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: Peekable<S>,
    state: State,
    lexeme: String,
    start: Location,
    last: Location,
    next: Location,
    failed: bool,
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        Lexer {
            source: source.peekable(),
            state: State::Start,
            lexeme: String::new(),
            last: start.clone(),
            next: start.clone(),
            start,
            failed: false,
        }
    }

    /// Consume todo el flujo y agrega un token final [`TokenKind::Eof`].
    ///
    /// El token de fin de entrada se ubica sobre el último carácter leído.
    pub fn tokenize(mut self) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next() {
            tokens.push(token?);
        }

        tokens.push(Located::at(Token::eof(), self.last.clone()));
        debug!(tokens = tokens.len(), "lexical analysis finished");

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Located<Token>>, Located<LexerError>> {
        loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let next_char = match self.source.peek() {
                None => None,
                Some(Ok((c, _))) => Some(*c),
                Some(Err(_)) => {
                    let error = match self.source.next() {
                        Some(Err(error)) => LexerError::Input(error),
                        _ => LexerError::Incomplete(mem::take(&mut self.lexeme)),
                    };

                    return Err(Located::at(error, self.next.clone()));
                }
            };

            // Los espacios solo se descartan entre tokens
            if let State::Start = self.state {
                match next_char {
                    None => return Ok(None),
                    Some(c) if classify(Some(c)) == Category::Space => {
                        self.consume();
                        continue;
                    }

                    Some(_) => self.start = self.next.clone(),
                }
            }

            let c = match next_char {
                Some(c) => c,
                None => {
                    return match self.state.accepts() {
                        Some(kind) => Ok(Some(self.emit(kind))),
                        None => Err(self.incomplete()),
                    }
                }
            };

            match transition(self.state, c) {
                Some(next) => {
                    self.lexeme.push(c);
                    self.state = next;
                    self.consume();
                }

                // El carácter que detiene al autómata no se consume
                None => {
                    return match self.state.accepts() {
                        Some(kind) => Ok(Some(self.emit(kind))),
                        None => Err(Located::at(LexerError::BadChar(c), self.next.clone())),
                    }
                }
            }
        }
    }

    /// Avanza un carácter, actualizando ubicaciones.
    fn consume(&mut self) {
        if let Some(Ok((_, next))) = self.source.next() {
            self.last = mem::replace(&mut self.next, next);
        }
    }

    /// Emite el lexema acumulado y regresa al estado inicial.
    fn emit(&mut self, kind: TokenKind) -> Located<Token> {
        let token = Token::new(kind, mem::take(&mut self.lexeme));
        let location = Location::span(self.start.clone(), &self.last);

        self.state = State::Start;
        Located::at(token, location)
    }

    fn incomplete(&mut self) -> Located<LexerError> {
        let location = Location::span(self.start.clone(), &self.last);
        Located::at(
            LexerError::Incomplete(mem::take(&mut self.lexeme)),
            location,
        )
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.lex() {
            Ok(token) => token.map(Ok),
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}
