//! The script the sandbox child runs.
//!
//! Protocol (one JSON object per line):
//!
//! - host → child: `evaluate {source, filename}`, then answers to resolves:
//!   `module {url, source}` or `missing {message}`
//! - child → host: any number of `resolve {id, parent, line}`, then exactly
//!   one of `done {exports, plugins}` or
//!   `error {kind, name, message, line?, stack?}`
//!
//! The child reads stdin synchronously, so `require` inside fetched modules is
//! an ordinary blocking call and only the user's top-level calls are async.

pub const HARNESS: &str = r#"'use strict';
const fs = require('fs');
const vm = require('vm');
const { StringDecoder } = require('string_decoder');

process.on('unhandledRejection', () => {});

const decoder = new StringDecoder('utf8');
const chunk = Buffer.alloc(65536);
let pending = '';

function readLine() {
  for (;;) {
    const nl = pending.indexOf('\n');
    if (nl !== -1) {
      const line = pending.slice(0, nl);
      pending = pending.slice(nl + 1);
      return line;
    }
    let n;
    try {
      n = fs.readSync(0, chunk, 0, chunk.length, null);
    } catch (err) {
      if (err.code === 'EAGAIN') continue;
      throw err;
    }
    if (n === 0) throw new Error('host closed the channel');
    pending += decoder.write(chunk.subarray(0, n));
  }
}

function send(msg) {
  const buf = Buffer.from(JSON.stringify(msg) + '\n');
  let off = 0;
  while (off < buf.length) {
    try {
      off += fs.writeSync(1, buf, off);
    } catch (err) {
      if (err.code !== 'EAGAIN') throw err;
    }
  }
}

class RequireError extends Error {
  constructor(message, line) {
    super(message);
    this.name = 'RequireError';
    this.line = line;
  }
}

const silent = () => {};
const context = vm.createContext({
  console: { log: silent, info: silent, warn: silent, error: silent, debug: silent },
  __load: load,
});

const modules = new Map();

function load(id, line, parent) {
  if (typeof id !== 'string') {
    throw new RequireError('module id must be a string, received ' + typeof id, line);
  }
  if (id.trim() === '') {
    throw new RequireError('module id must be non-empty', line);
  }

  send({ type: 'resolve', id, parent, line });
  const reply = JSON.parse(readLine());
  if (reply.type === 'missing') {
    throw new RequireError(reply.message, line);
  }
  if (modules.has(reply.url)) {
    return modules.get(reply.url).exports;
  }

  const mod = { exports: {} };
  modules.set(reply.url, mod);
  try {
    if (/\.json($|\?)/.test(reply.url)) {
      mod.exports = JSON.parse(reply.source);
    } else {
      const fn = vm.runInContext(
        '(function (module, exports, require) {' + reply.source + '\n})',
        context,
        { filename: reply.url },
      );
      fn.call(mod.exports, mod, mod.exports, (child) => load(child, line, reply.url));
    }
  } catch (err) {
    modules.delete(reply.url);
    if (err instanceof RequireError) throw err;
    const message = err && err.message !== undefined ? err.message : String(err);
    throw new RequireError("failed to load module '" + id + "': " + message, line);
  }
  return mod.exports;
}

function stripFunctions(value, seen = new Set()) {
  if (typeof value === 'function') return undefined;
  if (value === null || typeof value !== 'object') return value;
  if (seen.has(value)) return undefined;
  seen.add(value);
  let out;
  if (Array.isArray(value)) {
    out = value.filter((v) => typeof v !== 'function').map((v) => stripFunctions(v, seen));
  } else {
    out = {};
    for (const key of Object.keys(value)) {
      if (typeof value[key] !== 'function') out[key] = stripFunctions(value[key], seen);
    }
  }
  seen.delete(value);
  return out;
}

function get(obj, path, fallback) {
  let cur = obj;
  for (const part of String(path).split('.')) {
    if (cur === null || cur === undefined) return fallback;
    cur = cur[part];
  }
  return cur === undefined ? fallback : cur;
}

function runPlugins(config) {
  const out = { variants: [], utilities: [], components: [], base: [] };
  const list = config && Array.isArray(config.plugins) ? config.plugins : [];
  const collect = (into) => (styles) => {
    for (const s of [].concat(styles)) into.push(stripFunctions(s));
  };

  for (const plugin of list) {
    const handler = typeof plugin === 'function'
      ? plugin
      : plugin && typeof plugin.handler === 'function' ? plugin.handler : null;
    if (!handler) continue;
    try {
      handler({
        addVariant: (name) => { if (typeof name === 'string') out.variants.push(name); },
        addUtilities: collect(out.utilities),
        addComponents: collect(out.components),
        addBase: collect(out.base),
        e: (x) => x,
        prefix: (x) => x,
        theme: (path, fallback) => get(config, 'theme.' + path, fallback),
        config: (path, fallback) => get(config, path, fallback),
        variants: () => [],
        corePlugins: (path) => Array.isArray(config.corePlugins)
          ? config.corePlugins.includes(path)
          : get(config, 'corePlugins.' + path, true),
      });
    } catch (_) {}
  }
  return out;
}

function fail(err) {
  if (err instanceof RequireError) {
    send({ type: 'error', kind: 'require', name: err.name, message: err.message, line: err.line });
    return;
  }
  const isObject = err !== null && typeof err === 'object';
  send({
    type: 'error',
    kind: 'evaluation',
    name: isObject && typeof err.name === 'string' ? err.name : 'Error',
    message: isObject && err.message !== undefined ? String(err.message) : String(err),
    stack: isObject && typeof err.stack === 'string' ? err.stack : undefined,
  });
}

async function main() {
  const request = JSON.parse(readLine());
  const module = { exports: {} };

  let fn;
  try {
    fn = new vm.Script(request.source, { filename: request.filename }).runInContext(context);
    await fn(module, module.exports);
  } catch (err) {
    return fail(err);
  }

  const plugins = runPlugins(module.exports);
  let exports;
  try {
    exports = stripFunctions(module.exports);
    JSON.stringify(exports);
  } catch (err) {
    return fail(err);
  }
  send({ type: 'done', exports: exports === undefined ? null : exports, plugins });
}

main().catch(fail);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::wrap;

    #[test]
    fn harness_uses_the_wrapped_loader_name() {
        assert!(wrap::PREAMBLE.contains("__load("));
        assert!(HARNESS.contains("__load: load"));
    }

    #[test]
    fn harness_error_messages_match_host_expectations() {
        assert!(HARNESS.contains("module id must be non-empty"));
        assert!(HARNESS.contains("module id must be a string"));
        assert!(HARNESS.contains("failed to load module '"));
    }
}
