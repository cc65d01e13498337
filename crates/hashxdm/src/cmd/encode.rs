use hashxdm_codec::encode_message;
use serde::Serialize;

use crate::cmd::EncodeArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_record, schema_id, OutputFormat, Record};

#[derive(Serialize)]
struct EncodeOutput<'a> {
    schema_id: String,
    url: &'a str,
    sequence: u64,
    message: &'a str,
    encoded: String,
    length: usize,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let encoded = encode_message(&args.url, args.sequence, &args.message);
    tracing::debug!(sequence = args.sequence, length = encoded.len(), "encoded message");

    let out = EncodeOutput {
        schema_id: schema_id("encoded-message"),
        url: &args.url,
        sequence: args.sequence,
        message: &args.message,
        length: encoded.len(),
        encoded: encoded.clone(),
    };
    print_record(
        &Record {
            value: &out,
            fields: vec![
                ("sequence", args.sequence.to_string()),
                ("length", out.length.to_string()),
                ("encoded", encoded.clone()),
            ],
            raw: encoded,
        },
        format,
    );
    Ok(SUCCESS)
}
