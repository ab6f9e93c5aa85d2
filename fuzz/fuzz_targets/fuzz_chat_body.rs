#![no_main]

use campinova::gateway::api::extract_message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = extract_message(data);
});
