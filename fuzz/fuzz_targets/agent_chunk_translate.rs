#![no_main]

use docwatch_agent::AgentEventTranslator;
use docwatch_core::AgentEvent;
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);
    let mut translator = AgentEventTranslator::new();
    let mut finals = 0_usize;
    for line in input.lines() {
        let chunk = serde_json::from_str::<Value>(line)
            .unwrap_or_else(|_| Value::String(line.to_string()));
        for event in translator.translate(&chunk) {
            if matches!(event, AgentEvent::Final { .. }) {
                finals += 1;
            }
            assert!(serde_json::to_string(&event).is_ok());
        }
    }
    assert!(finals <= 1);
});
