//! In-process agent rendering.
//!
//! The instrumentation host executes JavaScript inside the target; this module
//! turns a `TargetProfile` into that script by substituting the serialized
//! profile into a generic template. The agent reports structured events back
//! to the controlling process (`ready`, `log`, `secret-parts`, `scan-match`
//! with a binary window payload, `scan-complete`, `hook-error`) and leaves
//! decoding and presentation to the Rust side.

use crate::error::Result;
use crate::profile::TargetProfile;

const PROFILE_SLOT: &str = "__PROFILE__";

pub fn render_agent(profile: &TargetProfile) -> Result<String> {
    profile.validate()?;
    let json = serde_json::to_string_pretty(profile)?;
    Ok(AGENT_TEMPLATE.replace(PROFILE_SLOT, &json))
}

const AGENT_TEMPLATE: &str = r#"'use strict';

const profile = __PROFILE__;

function report(payload, data) {
  send(payload, data || null);
}

function log(message) {
  report({ event: 'log', message: message });
}

function hookError(stage, message) {
  report({ event: 'hook-error', stage: stage, message: '' + message });
}

Java.perform(function () {
  log('VM runtime ready');

  profile.bypasses.forEach(function (h) {
    try {
      const cls = Java.use(h.class);
      cls[h.method].implementation = function () {
        log(h.class + '.' + h.method + '() called - returning ' + h.returns);
        return h.returns;
      };
      log('bypass installed: ' + h.class + '.' + h.method + ' -> ' + h.returns);
    } catch (e) {
      hookError('bypass', h.class + '.' + h.method + ': ' + e);
    }
  });

  profile.taps.forEach(function (h) {
    try {
      const cls = Java.use(h.class);
      cls[h.method].implementation = function () {
        const args = Array.prototype.slice.call(arguments);
        log(h.class + '.' + h.method + '() called with: ' + args.join(', '));
        const result = this[h.method].apply(this, args);
        log(h.class + '.' + h.method + '() returned: ' + result);
        return result;
      };
      log('tap installed: ' + h.class + '.' + h.method);
    } catch (e) {
      hookError('tap', h.class + '.' + h.method + ': ' + e);
    }
  });

  try {
    const cls = Java.use(profile.secret.class);
    const parts = profile.secret.fields.map(function (name) {
      const field = cls.class.getDeclaredField(name);
      field.setAccessible(true);
      const value = field.get(null);
      if (value === null) {
        throw new Error('field ' + name + ' is null');
      }
      const array = Java.array('int', value);
      const codes = [];
      for (let i = 0; i < array.length; i++) {
        codes.push(array[i]);
      }
      return codes;
    });
    report({ event: 'secret-parts', parts: parts });
  } catch (e) {
    hookError('secret', e);
  }

  if (profile.click) {
    try {
      const view = Java.use(profile.click.class);
      view[profile.click.method].implementation = function (listener) {
        if (listener !== null) {
          const originalOnClick = listener.onClick;
          listener.onClick = function (v) {
            log('click observed');
            originalOnClick.call(this, v);
          };
        }
        this[profile.click.method](listener);
      };
      log('click tap installed');
    } catch (e) {
      hookError('tap', profile.click.class + ': ' + e);
    }
  }

  log('VM hooks installed');
});

profile.native.hooks.forEach(function (h) {
  try {
    const target = Module.getExportByName(profile.native.module, h.export);
    Interceptor.attach(target, {
      onEnter: function (args) {
        log(h.export + '() called');
        if (h.string_arg) {
          try {
            const read = new NativeFunction(
              Module.getExportByName(h.string_arg.reader.module, h.string_arg.reader.symbol),
              'pointer', ['pointer', 'pointer', 'pointer']);
            const text = read(args[h.string_arg.env_index], args[h.string_arg.index], NULL);
            if (!text.isNull()) {
              log(h.export + ' input: ' + text.readCString());
            }
          } catch (e) {
            hookError('native', h.export + ' string read: ' + e);
          }
        }
      },
      onLeave: function (retval) {
        log(h.export + '() returned: ' + retval);
        if (h.force_return !== null && h.force_return !== undefined) {
          retval.replace(h.force_return);
          log(h.export + '() forced to return: ' + h.force_return);
        }
      }
    });
    log('native hook installed: ' + h.export);
  } catch (e) {
    hookError('native', h.export + ': ' + e);
  }
});

setTimeout(function () {
  log('scanning ' + profile.scan.module + ' for secret pattern');
  try {
    const base = Module.getBaseAddress(profile.scan.module);
    const end = Module.getExportByName(profile.scan.module, profile.scan.end_export);
    Memory.scan(base, end.sub(base), profile.scan.pattern, {
      onMatch: function (address, size) {
        const window = Memory.readByteArray(address, profile.scan.window);
        report({ event: 'scan-match', address: address.toString() }, window);
      },
      onComplete: function () {
        report({ event: 'scan-complete' });
      }
    });
  } catch (e) {
    hookError('scan', e);
  }
}, profile.scan.delay_ms);

report({ event: 'ready' });
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::builtin_profile;

    #[test]
    fn test_render_substitutes_profile() {
        let agent = render_agent(&builtin_profile()).unwrap();
        assert!(!agent.contains(PROFILE_SLOT));
        assert!(agent.contains("com.ctf.secureapp.HiddenCheck"));
        assert!(agent.contains("_Z16anti_debug_checkv"));
        assert!(agent.contains("41 50 49 49 54 7B"));
        assert!(agent.contains("\"delay_ms\": 2000"));
    }

    #[test]
    fn test_render_rejects_invalid_profile() {
        let mut profile = builtin_profile();
        profile.scan.pattern = String::new();
        assert!(render_agent(&profile).is_err());
    }

    #[test]
    fn test_template_is_self_contained() {
        // Exactly one substitution slot, and it is the profile.
        assert_eq!(AGENT_TEMPLATE.matches(PROFILE_SLOT).count(), 1);
    }
}
