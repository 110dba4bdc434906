//! JNI bindings for Android.
//!
//! These functions are called from Kotlin via the JNI bridge.

use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;

use crate::layout_json;

/// Lay out a JSON score and return the page as JSON.
///
/// Called from Kotlin as:
///   external fun layoutJson(score: String): String?
#[no_mangle]
pub extern "system" fn Java_org_scorelayout_ScoreLayout_layoutJson(
    mut env: JNIEnv,
    _class: JClass,
    score: JString,
) -> jstring {
    let json: String = match env.get_string(&score) {
        Ok(s) => s.into(),
        Err(_) => return std::ptr::null_mut(),
    };

    match layout_json(&json) {
        Ok(page) => match env.new_string(&page) {
            Ok(js) => js.into_raw(),
            Err(_) => std::ptr::null_mut(),
        },
        Err(e) => {
            log::debug!("layoutJson failed: {e}");
            std::ptr::null_mut()
        }
    }
}
