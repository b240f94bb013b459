use crate::coerce::{Format, S1_14, S1_9, S4_6, S_10, S_15, S_23};
use crate::value::round_half_even;
use crate::{assemble, Abort, Assembly, Options, Program, Severity, PROGLEN};

/// An unused program slot: `SKP 0,0`.
const EMPTY_SKP: u32 = 0x0000_0011;

fn clean(source: &str) -> Program {
    with_options(source, Options::default())
}

fn with_options(source: &str, options: Options) -> Program {
    let out = assemble(source, options);
    for d in &out.diagnostics {
        assert!(
            !matches!(d.severity, Severity::Error(_)),
            "unexpected error: {}",
            d
        );
    }
    out.program.expect("assembly failed")
}

fn failure(source: &str) -> Assembly {
    let out = assemble(source, Options::default());
    assert!(out.program.is_err(), "assembly unexpectedly succeeded");
    out
}

fn has_message(out: &Assembly, needle: &str) -> bool {
    out.diagnostics.iter().any(|d| d.message.contains(needle))
}

#[test]
fn empty_source_pads_the_whole_image() {
    let program = clean("");
    assert_eq!(program.as_bytes().len(), 512);
    for slot in 0..PROGLEN {
        assert_eq!(program.word(slot), EMPTY_SKP);
    }
}

#[test]
fn comment_only_source_is_empty() {
    let program = clean("; nothing here\n\n   ; still nothing");
    assert_eq!(program.word(0), EMPTY_SKP);
}

#[test]
fn sof_packs_coefficient_and_opcode() {
    let program = clean("SOF 1.0, 0.0");
    assert_eq!(program.word(0), 0x4000_000d);
    for slot in 1..PROGLEN {
        assert_eq!(program.word(slot), EMPTY_SKP);
    }
}

#[test]
fn mem_labels_address_the_region() {
    let program = clean("DEL MEM 100\nRDA DEL, 0.5\nRDA DEL^, 0.0\nRDA DEL#, 0.0");
    // base 0, coefficient round(0.5 * 512) = 0x100
    assert_eq!(program.word(0), 0x2000_0000);
    assert_eq!(program.word(1), 50 << 5);
    assert_eq!(program.word(2), 100 << 5);
}

#[test]
fn mem_regions_are_padded_by_one_cell() {
    let program = clean("A MEM 10\nB MEM 10\nRDA B, 0.0");
    assert_eq!(program.word(0), 11 << 5);
}

#[test]
fn skip_forward_offset_counts_intervening_slots() {
    let program = clean("SKP 0, end\nCLR\nCLR\nCLR\nCLR\nCLR\nend: CLR");
    assert_eq!(program.word(0), EMPTY_SKP | (5 << 21));
}

#[test]
fn skip_to_next_instruction_encodes_zero() {
    let program = clean("SKP RUN, end\nend: CLR");
    assert_eq!(program.word(0), EMPTY_SKP | (0x10 << 27));
}

#[test]
fn skip_condition_expression_and_immediate_offset() {
    let program = clean("SKP RUN|ZRC, 2\nCLR\nCLR\nCLR");
    assert_eq!(program.word(0), 0xc040_0011);
}

#[test]
fn jmp_is_an_unconditional_skip() {
    let program = clean("JMP end\nCLR\nend: CLR");
    assert_eq!(program.word(0), EMPTY_SKP | (1 << 21));
}

#[test]
fn backward_skip_target_is_rejected() {
    let out = failure("a: SKP 0, a");
    assert!(has_message(&out, "does not follow SKP"));
    assert_eq!(out.program, Err(Abort::Input));
}

#[test]
fn undefined_skip_target_is_rejected() {
    let out = failure("SKP 0, nowhere");
    assert!(has_message(&out, "Undefined target for SKP"));
}

#[test]
fn far_skip_target_is_rejected() {
    let mut source = String::from("SKP 0, end\n");
    for _ in 0..64 {
        source.push_str("CLR\n");
    }
    source.push_str("end: CLR");
    let out = failure(&source);
    assert!(has_message(&out, "too large"));
}

#[test]
fn skip_distance_of_sixty_three_is_accepted() {
    let mut source = String::from("SKP 0, end\n");
    for _ in 0..63 {
        source.push_str("CLR\n");
    }
    source.push_str("end: CLR");
    let program = clean(&source);
    assert_eq!(program.word(0), EMPTY_SKP | (63 << 21));
}

#[test]
fn raw_inserts_the_word_verbatim() {
    let program = clean("RAW $DEADBEEF");
    assert_eq!(program.word(0), 0xdead_beef);
}

#[test]
fn pseudo_expansions() {
    let program = clean("CLR\nNOT\nNOP\nABSA\nLDAX REG4");
    assert_eq!(program.word(0), 0x0000_000e); // AND 0
    assert_eq!(program.word(1), 0xffff_ff10); // XOR $ffffff
    assert_eq!(program.word(2), EMPTY_SKP);
    assert_eq!(program.word(3), 0x0000_0009); // MAXX 0,0
    assert_eq!(program.word(4), (0x24 << 5) | 0x05); // RDFX REG4,0
}

#[test]
fn register_instructions_pack_both_fields() {
    let program = clean("RDAX REG2, -1.0\nMULX POT1");
    assert_eq!(program.word(0), ((0x22_u32) << 5) | (0xc000 << 16) | 0x04);
    assert_eq!(program.word(1), (0x11 << 5) | 0x0a);
}

#[test]
fn wlds_packs_lfo_frequency_and_amplitude() {
    let program = clean("WLDS SIN0, 255, 16384");
    assert_eq!(program.word(0), (255 << 20) | (16384 << 5) | 0x12);
}

#[test]
fn wldr_packs_signed_coefficient_and_amplitude_code() {
    let program = clean("WLDR RMP0, -16384, 4096");
    assert_eq!(program.word(0), 0x5800_0012);
}

#[test]
fn cho_rdal_defaults_flags_and_address() {
    let program = clean("CHO RDAL, SIN0");
    assert_eq!(program.word(0), 0xc200_0014);
}

#[test]
fn cho_rdal_with_explicit_flags() {
    let program = clean("CHO RDAL, SIN1, COS");
    assert_eq!(program.word(0), 0xc020_0014 | (0x01 << 24));
}

#[test]
fn cho_rda_takes_flags_and_address() {
    let program = clean("CHO RDA, SIN0, SIN|COMPC, 0");
    assert_eq!(program.word(0), 0x0400_0014);
}

#[test]
fn cho_sine_flags_are_masked_with_a_warning() {
    let out = assemble("CHO RDA, SIN0, RPTR2, 0", Options::default());
    assert!(has_message(&out, "Cleared invalid Sine LFO flags"));
    let program = out.program.expect("assembly failed");
    assert_eq!(program.word(0), 0x0000_0014);
}

#[test]
fn cho_invalid_subtype_is_rejected() {
    let out = failure("CHO WRAX, SIN0, 0, 0");
    assert!(has_message(&out, "Invalid CHO subtype"));
}

#[test]
fn jam_forces_a_ramp_lfo() {
    let program = clean("JAM RMP1");
    assert_eq!(program.word(0), (3 << 6) | 0x13);
}

#[test]
fn log_offset_uses_the_wide_integer_format() {
    // round(-10.0 * 64) = -640 masked to 11 bits
    let program = clean("LOG 1.0, -10.0");
    assert_eq!(program.word(0), (0x4000 << 16) | ((-640_i64 as u32 & 0x7ff) << 5) | 0x0b);
}

#[test]
fn equ_binds_values_and_expressions() {
    let program = clean("half EQU 1/2\nSOF half, 0.0");
    assert_eq!(program.word(0), 0x2000_000d);
}

#[test]
fn equ_alias_resolves_through_the_chain() {
    let program = clean("EQU a REG3\nEQU b a\nMULX b");
    assert_eq!(program.word(0), (0x23 << 5) | 0x0a);
}

#[test]
fn equ_circular_alias_is_detected() {
    let out = failure("A EQU B\nB EQU A\nSOF A, 0.0");
    assert!(has_message(&out, "Circular definition"));
}

#[test]
fn equ_rebinding_warns() {
    let out = assemble("EQU k 1\nEQU k 2\nRAW k", Options::default());
    assert!(has_message(&out, "re-defined"));
    assert_eq!(out.program.expect("assembly failed").word(0), 2);
}

#[test]
fn reserved_cho_subtype_names_cannot_be_rebound() {
    let out = failure("EQU RDAL 5");
    assert!(has_message(&out, "Reserved symbol"));
}

#[test]
fn target_clashing_with_a_symbol_is_rejected() {
    let out = failure("REG0: CLR");
    assert!(has_message(&out, "already defined as a symbol"));
}

#[test]
fn duplicate_target_at_another_address_is_rejected() {
    let out = failure("x: CLR\nx: CLR");
    assert!(has_message(&out, "Label X redefined"));
}

#[test]
fn duplicate_target_at_the_same_address_is_idempotent() {
    clean("x: x: SKP 0, x2\nx2: CLR");
}

#[test]
fn expression_operators_follow_precedence() {
    let program = clean("RAW 1+2*3\nRAW 2**3**2\nRAW 96//10\nRAW ~0&$ff\nRAW 1<<4|1");
    assert_eq!(program.word(0), 7);
    assert_eq!(program.word(1), 512); // right associative power
    assert_eq!(program.word(2), 9);
    assert_eq!(program.word(3), 0xff);
    assert_eq!(program.word(4), 17);
}

#[test]
fn int_operator_rounds_ties_to_even() {
    let program = clean("RAW INT 2.5\nRAW INT 3.5\nRAW INT 0.4 + 7");
    assert_eq!(program.word(0), 2);
    assert_eq!(program.word(1), 4);
    assert_eq!(program.word(2), 7);
}

#[test]
fn integral_reals_promote_silently_for_bitwise_ops() {
    let out = assemble("RAW 2.0|1", Options::default());
    assert!(!out
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Warning));
    assert_eq!(out.program.expect("assembly failed").word(0), 3);
}

#[test]
fn fractional_reals_truncate_with_a_warning_for_bitwise_ops() {
    let out = assemble("RAW 2.5&3", Options::default());
    assert!(has_message(&out, "truncated"));
    assert_eq!(out.program.expect("assembly failed").word(0), 2);
}

#[test]
fn division_by_zero_is_reported() {
    let out = failure("RAW 1/0");
    assert!(has_message(&out, "Division by zero"));
}

#[test]
fn clamp_mode_clips_with_a_warning() {
    let options = Options {
        clamp: true,
        ..Options::default()
    };
    let out = assemble("SOF 3.0, 0.0", options);
    assert!(out
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Warning && d.message.contains("clamped")));
    let clipped = out.program.expect("assembly failed");
    let exact = with_options("SOF 1.99993896484375, 0.0", options);
    assert_eq!(clipped.word(0), exact.word(0));
    assert_eq!(clipped.word(0), 0x7fff_000d);
}

#[test]
fn reject_mode_substitutes_zero_and_fails() {
    let out = failure("SOF 3.0, 0.0");
    assert!(has_message(&out, "Invalid S1.14 arg for SOF"));
}

#[test]
fn spinreals_reads_bare_literals_as_reals() {
    let options = Options {
        spinreals: true,
        ..Options::default()
    };
    let program = with_options("SOF 1, 0.0", options);
    assert_eq!(program.word(0), 0x4000_000d);
    // without the option, 1 is an integer field
    let plain = clean("SOF 1, 0.0");
    assert_eq!(plain.word(0), 0x0001_000d);
}

#[test]
fn spinreals_replaces_missing_operands() {
    let options = Options {
        spinreals: true,
        ..Options::default()
    };
    let out = assemble("SOF , 0.0", options);
    assert!(has_message(&out, "Missing argument replaced with 0"));
    assert_eq!(out.program.expect("assembly failed").word(0), 0x0000_000d);
}

#[test]
fn missing_operand_is_an_error_without_spinreals() {
    let out = failure("SOF , 0.0");
    assert!(has_message(&out, "Expected name or value"));
}

#[test]
fn excess_operands_are_reported() {
    let out = failure("MULX REG0, 1");
    assert!(has_message(&out, "Excess operands for MULX"));
}

#[test]
fn undefined_symbol_is_reported() {
    let out = failure("SOF gain, 0.0");
    assert!(has_message(&out, "Undefined symbol"));
}

#[test]
fn max_program_is_rejected() {
    let source = "CLR\n".repeat(PROGLEN + 1);
    let out = failure(&source);
    assert!(has_message(&out, "Max program exceeded"));
}

#[test]
fn delay_memory_exhaustion() {
    let out = failure("big MEM 32767\nmore MEM 1");
    assert!(has_message(&out, "Delay exhausted."));
    let out = failure("a MEM 30000\nb MEM 3000");
    assert!(has_message(&out, "requested 3000 exceeds 2766 available"));
}

#[test]
fn mem_size_must_be_integer() {
    let out = failure("a MEM 1.5");
    assert!(has_message(&out, "not integer"));
}

#[test]
fn error_limit_aborts_with_parse_status() {
    let source = "MULX 99\n".repeat(11);
    let out = assemble(&source, Options::default());
    assert_eq!(out.program, Err(Abort::Parse));
}

#[test]
fn scan_errors_recover_and_count() {
    let out = failure("SOF @ 1.0, 0.0");
    assert!(has_message(&out, "Unrecognised input"));
    assert_eq!(out.program, Err(Abort::Input));
}

#[test]
fn diagnostics_are_in_source_order() {
    let out = failure("MULX 99\nSOF bad, 0.0");
    let lines: Vec<u32> = out
        .diagnostics
        .iter()
        .filter(|d| matches!(d.severity, Severity::Error(_)))
        .filter_map(|d| d.line)
        .collect();
    assert_eq!(lines, vec![1, 2]);
}

#[test]
fn multiple_statements_share_a_line() {
    let program = clean("CLR SOF 0.5, 0.0 end: CLR");
    assert_eq!(program.word(0), 0x0000_000e);
    assert_eq!(program.word(1), 0x2000_000d);
    assert_eq!(program.word(2), 0x0000_000e);
}

fn decode(format: &Format, field: i64) -> f64 {
    let span = format.mask + 1;
    let signed = if field > format.mask / 2 {
        field - span
    } else {
        field
    };
    signed as f64 / format.reference
}

#[test]
fn fixed_point_roundtrip_is_within_one_lsb() {
    for format in &[S1_14, S1_9, S_10, S_15, S4_6, S_23] {
        let steps = 257;
        for k in 0..=steps {
            let v = format.min + (format.max - format.min) * (k as f64) / (steps as f64);
            let field = round_half_even(v * format.reference) & format.mask;
            let back = decode(format, field);
            assert!(
                (back - v).abs() <= 1.0 / format.reference,
                "{}: {} -> {} -> {}",
                format.name,
                v,
                field,
                back
            );
        }
    }
}
