use std::path::PathBuf;

use miled_agent::kernel::{ComposeMode, KernelComposer};
use miled_agent::resolver::BotResolver;
use miled_agent::{ConfigSource, FileConfigSource};
use miled_core::RequestContext;

use crate::commands::{block_on, CommandResult};

const COMMAND: &str = "compose";

#[derive(Clone, Debug)]
pub struct ComposeArgs {
    pub document: PathBuf,
    pub bot_type: String,
    pub faculty_id: Option<String>,
    pub export: bool,
}

/// Resolves an agent from a local document and renders its system prompt
/// without touching the model provider.
pub fn run(args: ComposeArgs) -> CommandResult {
    let source = FileConfigSource::new(&args.document);
    let document = match block_on(source.fetch()) {
        Ok(Ok(document)) => document,
        Ok(Err(error)) => {
            return CommandResult::failure(COMMAND, "document_unavailable", error.to_string(), 2)
        }
        Err(error) => return CommandResult::failure(COMMAND, "runtime", error, 1),
    };

    let context = RequestContext { faculty_id: args.faculty_id, ..RequestContext::default() };
    let resolved = match BotResolver::new().resolve(&document, args.bot_type.trim(), &context) {
        Ok(resolved) => resolved,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "access_denied",
                format!("{error} for botType `{}`", args.bot_type),
                3,
            )
        }
    };

    let mode = if args.export { ComposeMode::Export } else { ComposeMode::Full };
    let prompt = KernelComposer::new().compose(&document.engine, resolved.agent, mode);
    CommandResult::success(COMMAND, prompt)
}
