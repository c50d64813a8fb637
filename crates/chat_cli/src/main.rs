use std::io::{self, BufRead};
use std::sync::{Arc, Mutex};

use chat_cli::logging::init_logging;
use chat_cli::providers;
use chat_cli::repl::{ConsoleObserver, LineOutcome, Repl, SharedOutput};
use chat_session::{ChatSession, SessionConfig, SessionRuntime};
use session_store::{FileKeyValueStore, SessionStore};

fn main() -> io::Result<()> {
    init_logging();

    let config = SessionConfig::from_env();
    tracing::info!(data_dir = %config.data_dir.display(), "starting chat");

    let provider = providers::provider_from_env(config.request_timeout).map_err(io::Error::other)?;
    let store = SessionStore::new(FileKeyValueStore::new(&config.data_dir));
    let session = ChatSession::open(store, config.session_options());

    let out: SharedOutput = Arc::new(Mutex::new(io::stdout()));
    let observer = Arc::new(ConsoleObserver::new(Arc::clone(&out)));
    let runtime = SessionRuntime::new(session, provider, observer);

    let mut repl = Repl::new(runtime, out);
    repl.greet();

    for line in io::stdin().lock().lines() {
        if repl.handle_line(&line?) == LineOutcome::Quit {
            break;
        }
    }

    repl.shutdown();
    Ok(())
}
