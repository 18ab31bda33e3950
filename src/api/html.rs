use crate::config::{DeviceSettings, PageLayout};

const SINGLE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Live Video Stream with Object Detection</title>
</head>
<body>
    <h1>Live Video Stream with Object Detection</h1>
    <img src="/video_feed" width="640" height="480">
</body>
</html>
"#;

const DUAL_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Live Video Streams</title>
    <script>
        function sendCommand(formId, deviceId) {
            const form = document.getElementById(formId);
            const command = form.elements["command"].value;

            fetch(`/send_command/${deviceId}`, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ command: command })
            })
            .then(response => response.json())
            .then(data => {
                const resultDiv = document.getElementById(`response_${deviceId}`);
                resultDiv.textContent = data.message;
            })
            .catch(error => console.error('Error:', error));

            return false;
        }
    </script>
</head>
<body>
    <h1>Live Video Streams</h1>
    <div>
        <h2>Object Detection</h2>
        <img src="/video_feed_detection" width="640" height="480">
    </div>
    <div>
        <h2>Object Tracking</h2>
        <img src="/video_feed_tracking" width="640" height="480">
    </div>
    <hr>
    <h1>ESP32 Control Panel</h1>

    <form id="form_1" onsubmit="return sendCommand('form_1', 1);">
        <label for="command_1">Command for ESP32 ({{device_1}}):</label>
        <input type="text" id="command_1" name="command" placeholder="Enter command for ESP32 1">
        <button type="submit">Send</button>
    </form>
    <div id="response_1"></div>

    <hr>

    <form id="form_2" onsubmit="return sendCommand('form_2', 2);">
        <label for="command_2">Command for ESP32 ({{device_2}}):</label>
        <input type="text" id="command_2" name="command" placeholder="Enter command for ESP32 2">
        <button type="submit">Send</button>
    </form>
    <div id="response_2"></div>
</body>
</html>
"#;

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub(crate) fn render_index(layout: PageLayout, devices: &DeviceSettings) -> String {
    match layout {
        PageLayout::Single => SINGLE_PAGE.to_string(),
        PageLayout::Dual => DUAL_PAGE
            .replace("{{device_1}}", &escape(&devices.device_1.host))
            .replace("{{device_2}}", &escape(&devices.device_2.host)),
    }
}
