#[macro_use]
extern crate clap;

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::process;

use clap::Arg;

use asfv1::{assemble, ihex, Options, Severity};

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("program source file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("OUTPUT")
                .help("assembled output file (default stdout)")
                .index(2),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("suppress warnings"),
        )
        .arg(
            Arg::with_name("clamp")
                .short("c")
                .long("clamp")
                .help("clamp out of range values without error"),
        )
        .arg(
            Arg::with_name("spinreals")
                .short("s")
                .long("spinreals")
                .help("read literals 2 and 1 as 2.0 and 1.0"),
        )
        .arg(
            Arg::with_name("program")
                .short("p")
                .takes_value(true)
                .value_name("N")
                .validator(program_number)
                .help("target program number (hex output)"),
        )
        .arg(
            Arg::with_name("binary")
                .short("b")
                .long("binary")
                .help("write binary output instead of hex"),
        )
        .version_short("v")
        .get_matches();

    let status = run(&matches);
    if status != 0 {
        process::exit(status);
    }
}

fn program_number(value: String) -> Result<(), String> {
    match value.parse::<usize>() {
        Ok(n) if n < 8 => Ok(()),
        _ => Err("program number must be 0..7".to_string()),
    }
}

fn run(matches: &clap::ArgMatches) -> i32 {
    let quiet = matches.is_present("quiet");
    let options = Options {
        clamp: matches.is_present("clamp"),
        spinreals: matches.is_present("spinreals"),
    };
    let infile = matches.value_of("INPUT").unwrap();
    let outfile = matches.value_of("OUTPUT");

    if !quiet {
        eprintln!("FV-1 Assembler v{}", crate_version!());
        eprintln!("info: Reading input from {}", infile);
    }
    let raw = match fs::read(infile) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("error: reading input: {}", err);
            return -1;
        }
    };
    let (source, note) = decode_source(&raw);
    if !quiet {
        if let Some(note) = note {
            eprintln!("info: {}", note);
        }
    }

    let result = assemble(&source, options);
    for diagnostic in &result.diagnostics {
        if quiet && !matches!(diagnostic.severity, Severity::Error(_)) {
            continue;
        }
        eprintln!("{}", diagnostic);
    }
    let program = match result.program {
        Ok(program) => program,
        Err(abort) => {
            eprintln!("error: {}", abort);
            return abort.status();
        }
    };

    let mut binary = matches.is_present("binary");
    if binary && outfile.is_none() && io::stdout().is_terminal() {
        binary = false;
        if !quiet {
            eprintln!("warning: Terminal output forced to hex");
        }
    }
    let outname = outfile.unwrap_or("<stdout>");
    let data = if binary {
        if !quiet {
            eprintln!("info: Writing binary output to {}", outname);
        }
        program.as_bytes().to_vec()
    } else {
        let slot: usize = matches
            .value_of("program")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let offset = slot * 512;
        if !quiet && matches.is_present("program") {
            eprintln!("info: Selected program {} at offset 0x{:04X}", slot, offset);
        }
        if !quiet {
            eprintln!("info: Writing hex output to {}", outname);
        }
        ihex::to_ihex(program.as_bytes(), offset, 4).into_bytes()
    };
    let written = match outfile {
        Some(path) => fs::write(path, &data),
        None => io::stdout().write_all(&data),
    };
    if let Err(err) = written {
        eprintln!("error: writing output: {}", err);
        return -1;
    }
    0
}

/// Decode raw input bytes. SpinASM sources are often UTF-16; honour a
/// byte order mark, fall back to a zero-byte heuristic, else UTF-8.
fn decode_source(raw: &[u8]) -> (String, Option<&'static str>) {
    if raw.len() > 2 && raw[0] == 0xff && raw[1] == 0xfe {
        (
            decode_utf16(raw, true),
            Some("Input encoding set to UTF-16LE by BOM"),
        )
    } else if raw.len() > 2 && raw[0] == 0xfe && raw[1] == 0xff {
        (
            decode_utf16(raw, false),
            Some("Input encoding set to UTF-16BE by BOM"),
        )
    } else if raw.len() > 7 && raw[7] == 0x00 {
        (
            decode_utf16(raw, true),
            Some("Input encoding set to UTF-16LE"),
        )
    } else {
        (String::from_utf8_lossy(raw).into_owned(), None)
    }
}

fn decode_utf16(raw: &[u8], little_endian: bool) -> String {
    let units: Vec<u16> = raw
        .chunks(2)
        .map(|pair| {
            let (a, b) = if pair.len() == 2 {
                (pair[0], pair[1])
            } else {
                (pair[0], 0)
            };
            if little_endian {
                u16::from_le_bytes([a, b])
            } else {
                u16::from_be_bytes([a, b])
            }
        })
        .collect();
    std::char::decode_utf16(units)
        .map(|r| r.unwrap_or(std::char::REPLACEMENT_CHARACTER))
        .collect()
}
