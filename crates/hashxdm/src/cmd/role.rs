use hashxdm_codec::{resolve_role_from_location, ChannelRole};
use serde::Serialize;

use crate::cmd::RoleArgs;
use crate::exit::{codec_error, CliResult, SUCCESS};
use crate::output::{print_record, schema_id, OutputFormat, Record};

#[derive(Serialize)]
struct RoleOutput<'a> {
    schema_id: String,
    location: &'a str,
    #[serde(flatten)]
    role: &'a ChannelRole,
}

pub fn run(args: RoleArgs, format: OutputFormat) -> CliResult<i32> {
    let role = resolve_role_from_location(&args.location)
        .map_err(|err| codec_error("role resolution failed", err))?;

    let mut fields = vec![(
        "role",
        if role.is_host() { "host" } else { "guest" }.to_string(),
    )];
    if let ChannelRole::Guest(params) = &role {
        fields.push(("channel", params.channel.clone()));
        fields.push(("remote_url", params.remote_url.clone()));
        fields.push(("use_parent", params.use_parent.to_string()));
        fields.push(("use_polling", params.use_polling.to_string()));
    }
    let raw = fields[0].1.clone();

    let out = RoleOutput {
        schema_id: schema_id("channel-role"),
        location: &args.location,
        role: &role,
    };
    print_record(
        &Record {
            value: &out,
            fields,
            raw,
        },
        format,
    );
    Ok(SUCCESS)
}
