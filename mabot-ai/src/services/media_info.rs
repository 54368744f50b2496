//! Media properties read from downloaded bytes
//!
//! Discovery only sees file names and sizes, so the meeting duration comes
//! from the container itself. Anything lofty cannot parse simply has no
//! duration; the record then shows `"NA"`.

use lofty::prelude::*;
use lofty::probe::Probe;
use std::io::Cursor;
use tracing::debug;

/// Playback duration in milliseconds, if the format is recognised
pub fn duration_ms(bytes: &[u8]) -> Option<u64> {
    let guessed = match Probe::new(Cursor::new(bytes)).guess_file_type() {
        Ok(guessed) => guessed,
        Err(e) => {
            debug!(error = %e, "Could not detect media type");
            return None;
        }
    };

    let tagged_file = match guessed.read() {
        Ok(file) => file,
        Err(e) => {
            debug!(error = %e, "Could not read media properties");
            return None;
        }
    };

    let millis = tagged_file.properties().duration().as_millis();
    if millis == 0 {
        return None;
    }
    u64::try_from(millis).ok()
}
