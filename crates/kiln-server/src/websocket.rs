//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// WebSocket endpoint.
pub const WS_PATH: &str = "/__kiln/ws";

/// Client script endpoint, injected into every served page.
pub const CLIENT_PATH: &str = "/__kiln/client.js";

/// Messages sent to browsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Connection established
    Connected,

    /// Full page reload
    Reload,

    /// Swap one stylesheet without reloading
    Css {
        /// Site-absolute URL of the stylesheet
        href: String,
    },

    /// A rebuild failed
    BuildError { task: String, message: String },
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers is fine
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// The browser side of live reload.
///
/// Connects back to the serving host, so it works behind any bind address.
pub fn client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  var protocol = location.protocol === 'https:' ? 'wss://' : 'ws://';
  var ws = new WebSocket(protocol + location.host + '{ws_path}');
  var overlay = null;

  function swapStylesheet(href) {{
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var swapped = false;
    links.forEach(function(link) {{
      var url = new URL(link.href, location.href);
      if (url.pathname === href) {{
        url.searchParams.set('v', Date.now());
        link.href = url.toString();
        swapped = true;
      }}
    }});
    if (!swapped) {{
      location.reload();
    }}
  }}

  function showError(task, message) {{
    if (!overlay) {{
      overlay = document.createElement('pre');
      overlay.style.cssText = 'position:fixed;left:0;right:0;bottom:0;margin:0;padding:1em;' +
        'max-height:50vh;overflow:auto;background:#300;color:#fcc;font:12px monospace;z-index:2147483647';
      overlay.onclick = function() {{ overlay.remove(); overlay = null; }};
      document.body.appendChild(overlay);
    }}
    overlay.textContent = '[kiln] ' + task + ' failed\n\n' + message;
  }}

  ws.onmessage = function(event) {{
    var msg = JSON.parse(event.data);

    switch (msg.type) {{
      case 'reload':
        location.reload();
        break;

      case 'css':
        if (overlay) {{ overlay.remove(); overlay = null; }}
        swapStylesheet(msg.href);
        break;

      case 'build_error':
        console.error('[kiln] ' + msg.task + ' failed:', msg.message);
        showError(msg.task, msg.message);
        break;

      case 'connected':
        console.log('[kiln] Live reload connected');
        break;
    }}
  }};

  ws.onclose = function() {{
    console.log('[kiln] Disconnected, waiting for server');
    setTimeout(function poll() {{
      fetch('{client_path}').then(function() {{
        location.reload();
      }}, function() {{
        setTimeout(poll, 1000);
      }});
    }}, 1000);
  }};
}})();
"#,
        ws_path = WS_PATH,
        client_path = CLIENT_PATH,
    )
}
