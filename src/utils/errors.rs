//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common error scenarios.

use std::fmt::Write;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    // Match against the whole context chain, not just the outermost message
    let error_msg = format!("{:#}", error);

    if error_msg.contains("FUSE") || error_msg.contains("fuse") || error_msg.contains("mount") {
        format_fuse_error(&mut output);
    } else if error_msg.contains("bind") || error_msg.contains("connect") {
        format_network_error(&mut output);
    } else if error_msg.contains("config") {
        format_config_error(&mut output);
    } else {
        format_generic_error(&mut output, &error.to_string());
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: cliprdr-bridge -vv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Report issues: https://github.com/lamco-admin/cliprdr-bridge/issues"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_fuse_error(output: &mut String) {
    writeln!(output, "File Transfer Mount Error").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "Could not mount the filesystem that exposes received files."
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. FUSE is not available").ok();
    writeln!(output, "     → Check: ls -l /dev/fuse").ok();
    writeln!(output, "     → Install: sudo apt install fuse3").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Mount point is busy").ok();
    writeln!(
        output,
        "     → Run: fusermount3 -u $XDG_RUNTIME_DIR/cliprdr-bridge"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  3. Running without the mount").ok();
    writeln!(
        output,
        "     → Drop --mount; files still stream to local readers"
    )
    .ok();
}

fn format_network_error(output: &mut String) {
    writeln!(output, "Channel Transport Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not open the clipboard channel to the peer.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Port already in use").ok();
    writeln!(output, "     → Check: ss -tlnp | grep 19595").ok();
    writeln!(
        output,
        "     → Change in config.toml: listen_addr = '127.0.0.1:19596'"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  2. Peer is not listening").ok();
    writeln!(output, "     → Start the other side with --listen first").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Invalid address").ok();
    writeln!(output, "     → Should be: 'IP:PORT' like '127.0.0.1:19595'").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Out of range values").ok();
    writeln!(
        output,
        "     → poll_interval_ms must be shorter than the response timeout"
    )
    .ok();
    writeln!(
        output,
        "     → max_data_size plus 4 bytes cannot exceed transport.max_frame_size"
    )
    .ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Bridge Error").ok();
    writeln!(output).ok();
    writeln!(output, "An error occurred while running the clipboard bridge.").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
}
