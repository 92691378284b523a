//! Setup command - claim a SimpleFIN setup token

use anyhow::Result;
use archiver_core::adapters::simplefin::claim_access_url;
use archiver_core::config::Config;
use archiver_core::LogEvent;

use super::{get_data_dir, get_logger, log_event};
use crate::output;

pub fn run(token: &str, json: bool) -> Result<()> {
    let logger = get_logger();
    let dir = get_data_dir()?;
    let mut config = Config::load(&dir)?;

    let access_url = match claim_access_url(token.trim(), config.sync.timeout()) {
        Ok(url) => url,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("setup_failed")
                    .with_integration("simplefin")
                    .with_error(e.to_string()),
            );
            return Err(e.into());
        }
    };

    config.simplefin_access_url = Some(access_url);
    config.save(&dir)?;
    log_event(&logger, LogEvent::new("setup_completed").with_integration("simplefin"));

    if json {
        return output::print_json(&serde_json::json!({"configured": true}));
    }
    output::success("SimpleFIN access URL saved");
    output::info("Run 'sfa sync' to archive your accounts.");
    Ok(())
}
