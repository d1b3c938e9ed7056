//! Host bridge backed by a JavaScript callback.

use bloc_editor::{BridgeError, BridgePayload, HostBridge};
use wasm_bindgen::JsValue;

/// Delivers each payload to a JS function as a JSON string.
pub struct JsBridge {
    callback: js_sys::Function,
}

impl JsBridge {
    pub fn new(callback: js_sys::Function) -> Self {
        Self { callback }
    }
}

impl HostBridge for JsBridge {
    fn notify(&self, payload: &BridgePayload) -> Result<(), BridgeError> {
        let json = serde_json::to_string(payload)?;
        self.callback
            .call1(&JsValue::NULL, &JsValue::from_str(&json))
            .map(|_| ())
            .map_err(|err| BridgeError::Rejected {
                event: payload.event,
                message: err.as_string().unwrap_or_else(|| format!("{err:?}")),
            })
    }
}
