//! Rastreo de ubicaciones en el código fuente.
//!
//! Cada token, nodo y error del compilador conserva el rango de
//! columnas de donde proviene, junto con una referencia al archivo.
//! Las líneas leídas se retienen para poder citarlas en diagnósticos.

use std::{
    cell::RefCell,
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead, Lines},
    ops::Range,
    rc::Rc,
    vec,
};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Flujo de caracteres con ubicación.
///
/// Cada carácter emitido incluye la ubicación del carácter que le sigue.
pub trait InputStream: Iterator<Item = Result<(char, Location), io::Error>> {}

impl<I> InputStream for I where I: Iterator<Item = Result<(char, Location), io::Error>> {}

/// Un valor junto con el lugar del código fuente del que proviene.
#[derive(Debug, Clone)]
pub struct Located<T> {
    value: T,
    location: Location,
}

impl<T> Located<T> {
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    pub fn val(&self) -> &T {
        &self.value
    }

    pub fn location(&self) -> &Location {
        &self.location
    }
}

/// Rango de posiciones dentro de un origen.
#[derive(Clone)]
pub struct Location {
    source: Rc<Source>,
    range: Range<Position>,
}

impl Location {
    /// Rango desde el inicio de `from` hasta el final de `to`, en el mismo origen.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            source: from.source,
            range: from.range.start..to.range.end,
        }
    }

    /// Ubicación de nodos que no derivan de un token.
    pub fn unknown() -> Self {
        Location::column(Rc::new(Source::new(String::from("<unknown>"))), Position::default())
    }

    pub fn start(&self) -> Position {
        self.range.start
    }

    pub fn end(&self) -> Position {
        self.range.end
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    fn column(source: Rc<Source>, at: Position) -> Self {
        Location {
            source,
            range: at..at.advance(),
        }
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.source.name, self.range.start)
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let Range { start, end } = &self.range;
        write!(formatter, "{}:{}..{}", self.source.name, start, end)
    }
}

/// Línea y columna, ambas a partir de 1.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    fn advance(self) -> Position {
        Position {
            column: self.column + 1,
            ..self
        }
    }

    fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position { column, ..self }
    }

    /// Posición del carácter que sigue a `c`.
    fn after(self, c: char) -> Position {
        match c {
            '\n' => self.newline(),
            '\t' => self.tab(),
            _ => self.advance(),
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Lee un origen carácter por carácter.
///
/// Retorna la ubicación del primer carácter y el flujo. Toda línea
/// termina en `'\n'`, aunque el archivo no lo haga. El flujo se
/// detiene después del primer error de lectura.
pub fn consume<R, S>(reader: R, name: S) -> (Location, impl InputStream)
where
    R: BufRead,
    S: Into<String>,
{
    let source = Rc::new(Source::new(name.into()));
    let start = Location::column(Rc::clone(&source), Position::default());

    let chars = Chars {
        lines: reader.lines(),
        source,
        pending: Vec::new().into_iter(),
        here: Position::default(),
        failed: false,
    };

    (start, chars)
}

/// Nombre de un origen y las líneas leídas hasta el momento.
pub struct Source {
    name: String,
    lines: RefCell<Vec<String>>,
}

impl Source {
    fn new(name: String) -> Self {
        Source {
            name,
            lines: Default::default(),
        }
    }

    /// Invoca a `callback` con el texto de una línea ya leída.
    ///
    /// Retorna `None` si la línea no existe o aún no ha sido leída.
    pub fn with_line<F, R>(&self, line: u32, callback: F) -> Option<R>
    where
        F: FnOnce(&str) -> R,
    {
        let index = (line as usize).checked_sub(1)?;
        self.lines.borrow().get(index).map(|line| callback(line))
    }
}

struct Chars<R> {
    lines: Lines<R>,
    source: Rc<Source>,
    pending: vec::IntoIter<char>,
    here: Position,
    failed: bool,
}

impl<R: BufRead> Iterator for Chars<R> {
    type Item = Result<(char, Location), io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(c) = self.pending.next() {
                self.here = self.here.after(c);
                let location = Location::column(Rc::clone(&self.source), self.here);

                return Some(Ok((c, location)));
            } else if self.failed {
                return None;
            }

            match self.lines.next()? {
                Ok(line) => {
                    let mut chars: Vec<_> = line.chars().collect();
                    chars.push('\n');

                    self.source.lines.borrow_mut().push(line);
                    self.pending = chars.into_iter();
                }

                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_char_carries_the_next_position() {
        let (start, stream) = consume("(1\n 2)".as_bytes(), "test");
        let chars: Vec<_> = stream.map(Result::unwrap).collect();

        assert_eq!(start.start(), Position { line: 1, column: 1 });

        let positions: Vec<_> = chars
            .iter()
            .map(|(c, location)| (*c, location.start().line(), location.start().column()))
            .collect();

        assert_eq!(
            positions,
            vec![
                ('(', 1, 2),
                ('1', 1, 3),
                ('\n', 2, 1),
                (' ', 2, 2),
                ('2', 2, 3),
                (')', 2, 4),
                ('\n', 3, 1),
            ]
        );
    }

    #[test]
    fn tabs_advance_to_next_stop() {
        let position = Position { line: 1, column: 2 };
        assert_eq!(position.tab().column(), 5);
        assert_eq!(position.tab().tab().column(), 9);
    }

    #[test]
    fn read_failure_ends_the_stream() {
        let (_, stream) = consume(&[b'(', 0xff, b'\n', b'1'][..], "test");
        let items: Vec<_> = stream.collect();

        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[test]
    fn lines_are_retained_for_diagnostics() {
        let (start, stream) = consume("(1 2 +)\n(MEM)".as_bytes(), "test");
        stream.for_each(drop);

        let source = start.source();
        assert_eq!(source.with_line(2, str::to_owned).as_deref(), Some("(MEM)"));
        assert_eq!(source.with_line(3, str::to_owned), None);
        assert_eq!(source.with_line(0, str::to_owned), None);
    }

    #[test]
    fn spans_report_their_start() {
        let (start, stream) = consume("RES".as_bytes(), "file.rpn");
        let chars: Vec<_> = stream.map(Result::unwrap).collect();

        let span = Location::span(start.clone(), &chars[2].1);
        assert_eq!(span.to_string(), "file.rpn:1:1");
        assert_eq!((span.start().column(), span.end().column()), (1, 5));
        assert_eq!(chars[2].1.to_string(), "file.rpn:1:4");
    }
}
