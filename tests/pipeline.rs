use rpnc::{compile, CompileOptions};

fn assemble(source: &str, options: CompileOptions) -> Result<String, String> {
    match compile(source.as_bytes(), "test.rpn", options) {
        Ok(program) => {
            let mut output = Vec::new();
            program.write_asm(&mut output).unwrap();
            Ok(String::from_utf8(output).unwrap())
        }

        Err(diagnostics) => Err(diagnostics.to_string()),
    }
}

fn asm(source: &str) -> String {
    assemble(source, CompileOptions::empty()).unwrap()
}

fn error(source: &str) -> String {
    assemble(source, CompileOptions::empty()).unwrap_err()
}

/// Código de usuario, entre `main:` y el ciclo de espera.
fn main_body(asm: &str) -> &str {
    let start = asm.find("\nmain:\n").unwrap() + "\nmain:\n".len();
    let end = asm.find("\nhalt:\n").unwrap() + 1;
    &asm[start..end]
}

#[test]
fn folded_addition() {
    let asm = asm("(1 2 +)");
    let body = main_body(&asm);

    assert!(body.contains("\tLDI     r24, 0\n\tLDI     r25, 66\n"));
    assert!(body.contains("\tSTS     results+0, r24\n\tSTS     results+1, r25\n"));
    assert!(body.contains("\tRCALL   print_f16\n"));
    assert!(!body.contains("add_f16"));
    assert!(asm.contains("results: .byte 2\n"));
}

#[test]
fn output_layout() {
    let asm = asm("(1 2 +)");

    let include = asm.find(".include \"m328Pdef.inc\"").unwrap();
    let main = asm.find("\nmain:\n").unwrap();
    let halt = asm.find("\nhalt:\n").unwrap();
    let data = asm.find("\n.dseg\n").unwrap();

    assert!(include < main && main < halt && halt < data);
    assert!(asm[data..].contains("T1_L: .byte 1\nT1_H: .byte 1\n"));
    assert!(asm[data..].contains("storeVal: .byte 2\n"));
    assert!(asm[data..].contains(".equ BUFFER_SIZE = 11"));
}

#[test]
fn loop_over_grouped_body() {
    let asm = asm("(10 (0.5) FOR)");
    let body = main_body(&asm);

    // 10.0 = 0x4900, 0.5 = 0x3800
    assert!(body.contains("\tLDI     r22, 0\n\tLDI     r23, 73\n\tRCALL   f16_to_uint16\n"));
    assert!(body.contains("\tLDI     r24, 0\n\tLDI     r25, 56\n\tSTS     T1_L, r24\n"));

    let start = body.find("for_start_1:\n").unwrap();
    let end = body.find("for_end_1:\n").unwrap();
    assert!(start < end);
    assert!(body[start..end].contains("\tRJMP    for_start_1\n"));
    assert!(body[start..end].contains("\tBRNE    skip_1\n\tRJMP    for_end_1\n"));
}

#[test]
fn res_reads_previous_lines() {
    let asm = asm("(1 2 +)\n(3 4 *)\n(2 RES)\n((1 RES) 1 +)");
    let body = main_body(&asm);

    assert!(body.contains("\tLDI     r24, 0\n\tRCALL   res_op\n"));
    assert!(body.contains("\tLDI     r24, 2\n\tRCALL   res_op\n"));
    assert!(body.contains("\tSTS     results+6, r24\n\tSTS     results+7, r25\n"));
    assert!(asm.contains("results: .byte 8\n"));
}

#[test]
fn memory_cell() {
    let asm = asm("(2.5 MEM)\n((MEM) 2 *)");
    let body = main_body(&asm);

    let write = body.find("RCALL   set_mem").unwrap();
    let read = body.find("RCALL   get_mem").unwrap();
    assert!(write < read);
    assert!(body.contains("; Promote 2 to FLOAT\n"));
}

#[test]
fn conditional_expression() {
    let asm = asm("((((1 2 -) IF) (3 MEM) THEN) (4 MEM) ELSE)");
    let body = main_body(&asm);

    assert!(body.contains("\tRCALL   is_f16_zero\n\tBRNE    skip_1\n\tRJMP    else_1\nskip_1:\n"));
    assert!(body.contains("\tRJMP    endif_1\nelse_1:\n"));
    assert!(body.contains("endif_1:\n"));
}

#[test]
fn output_is_deterministic() {
    let source = "(1 2 +)\n((1 RES) 0.5 *)\n(((1 IF) 2 THEN) 3 ELSE)\n(3 (MEM) FOR)";
    assert_eq!(asm(source), asm(source));
}

#[test]
fn lexical_error_is_rendered() {
    let expected = "\
Lexical error: Unexpected character: '#'
 --> test.rpn:2:4
  |
2 | (1 # 2)
  |    ^

Build failed with 1 error
";

    assert_eq!(error("(1 2 +)\n(1 # 2)"), expected);
}

#[test]
fn syntax_error_is_rendered() {
    let rendered = error("(1 2 +");
    assert!(rendered.starts_with("Syntax error: Expected R_PAREN, found EOF\n"));
}

#[test]
fn semantic_errors() {
    assert!(error("(100 0 /)").starts_with("Semantic error: Division by literal zero\n"));
    assert!(error("(5 RES)").starts_with(
        "Semantic error: Cannot 'RES' 5 lines back. Only 0 previous result(s) are available.\n"
    ));
    assert!(error("(((1 IF) 2 THEN) 3.0 ELSE)")
        .starts_with("Semantic error: Incompatible types in conditional branches\n"));
}

#[test]
fn strict_types() {
    assert!(assemble("(1 2.5 +)", CompileOptions::empty()).is_ok());

    let rendered = assemble("(1 2.5 +)", CompileOptions::STRICT_TYPES).unwrap_err();
    assert!(rendered.starts_with(
        "Semantic error: Incompatible types for '+': INT and FLOAT (automatic promotion disabled)\n"
    ));
}

#[test]
fn caret_spans_whole_token() {
    let rendered = error("(1 2 +)\n(1.5 RES)");
    assert!(rendered.contains("2 | (1.5 RES)\n  |  ^^^\n"));
}
