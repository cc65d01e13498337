use hashxdm_codec::{parse_fragment, percent_decode};
use serde::Serialize;

use crate::cmd::DecodeArgs;
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_record, schema_id, OutputFormat, Record};

#[derive(Serialize)]
struct DecodeOutput<'a> {
    schema_id: String,
    sequence: u64,
    payload: &'a str,
    message: String,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let fragment = fragment_of(&args.input);
    let parsed = parse_fragment(fragment);
    let sequence = parsed.sequence.ok_or_else(|| {
        CliError::new(
            DATA_INVALID,
            format!("fragment '{fragment}' carries no sequence number"),
        )
    })?;
    let message = percent_decode(parsed.payload);

    let out = DecodeOutput {
        schema_id: schema_id("decoded-message"),
        sequence,
        payload: parsed.payload,
        message: message.clone(),
    };
    print_record(
        &Record {
            value: &out,
            fields: vec![
                ("sequence", sequence.to_string()),
                ("message", message.clone()),
            ],
            raw: message,
        },
        format,
    );
    Ok(SUCCESS)
}

/// The fragment of a URL, or the input itself when it has no `#`.
fn fragment_of(input: &str) -> &str {
    match input.find('#') {
        Some(index) => &input[index..],
        None => input,
    }
}
