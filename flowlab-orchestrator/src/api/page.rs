//! Single-page front-end served at `/`

pub(super) const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>FlowLab Wind Tunnel</title>
    <style>
        :root {
            --bg: #1a1a2e;
            --card: #16213e;
            --accent: #0f3460;
            --highlight: #e94560;
            --text: #eee;
            --muted: #888;
            --success: #4ade80;
            --error: #f87171;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: 'SF Mono', 'Consolas', monospace;
            background: var(--bg);
            color: var(--text);
            min-height: 100vh;
            padding: 20px;
        }
        .container { max-width: 1400px; margin: 0 auto; }
        h1 { font-size: 1.5rem; margin-bottom: 20px; color: var(--highlight); }
        h2 { font-size: 1.1rem; margin-bottom: 12px; }
        .card {
            background: var(--card);
            border-radius: 8px;
            padding: 16px;
            margin-bottom: 16px;
        }
        .row { display: flex; gap: 16px; align-items: flex-start; }
        .main { flex: 3; }
        .side { flex: 1; }
        button {
            background: var(--accent);
            color: var(--text);
            border: none;
            padding: 8px 16px;
            border-radius: 4px;
            cursor: pointer;
            font-family: inherit;
        }
        button:disabled { opacity: 0.4; cursor: default; }
        button.primary { background: var(--highlight); }
        pre#log {
            background: #0b0b16;
            padding: 10px;
            height: 260px;
            overflow-y: auto;
            font-size: 0.8rem;
            white-space: pre-wrap;
        }
        .status { color: var(--muted); margin-top: 8px; }
        .status.ok { color: var(--success); }
        .status.err { color: var(--error); }
        .flow-metric .label { display: block; color: var(--muted); }
        .flow-metric .value { font-size: 2rem; }
        a.download { color: var(--highlight); display: inline-block; margin-top: 12px; }
    </style>
</head>
<body>
<div class="container">
    <h1>FlowLab Wind Tunnel</h1>

    <div class="card">
        <h2>1. Upload body mesh (.stl)</h2>
        <input type="file" id="mesh" accept=".stl">
        <button id="upload">Upload</button>
        <div class="status" id="uploadStatus"></div>
    </div>

    <div class="card">
        <h2>2. Run simulation</h2>
        <button class="primary" id="run" disabled>Run wind tunnel</button>
        <button id="cancel" disabled>Cancel</button>
        <div class="status" id="runStatus"></div>
        <pre id="log"></pre>
    </div>

    <div class="row">
        <div class="card main">
            <h2>3D Interactive Flow View</h2>
            <button id="visualize" disabled>Visualize results</button>
            <div class="status" id="vizStatus"></div>
            <div id="viewer"></div>
        </div>
        <div class="card side">
            <h2>Aerodynamics</h2>
            <div id="metric" class="flow-metric"></div>
            <a class="download" id="download" style="display:none">Download 3D Model (.glb)</a>
        </div>
    </div>
</div>

<script>
    let sessionId = null;
    let logNext = 0;
    let polling = null;

    const $ = (id) => document.getElementById(id);

    function setStatus(id, text, cls) {
        const el = $(id);
        el.textContent = text;
        el.className = 'status' + (cls ? ' ' + cls : '');
    }

    async function api(method, path, body) {
        const res = await fetch(path, { method, body });
        const text = await res.text();
        let data = null;
        try { data = JSON.parse(text); } catch { data = text; }
        if (!res.ok) {
            throw new Error((data && data.error) || res.statusText);
        }
        return data;
    }

    async function ensureSession() {
        if (sessionId) return sessionId;
        const data = await api('POST', '/sessions');
        sessionId = data.id;
        return sessionId;
    }

    $('upload').onclick = async () => {
        const file = $('mesh').files[0];
        if (!file) { setStatus('uploadStatus', 'Choose a file first', 'err'); return; }
        try {
            const id = await ensureSession();
            const name = encodeURIComponent(file.name);
            const data = await api('PUT', `/sessions/${id}/mesh?filename=${name}`, file);
            setStatus('uploadStatus', `Uploaded ${file.name} (${data.bytes} bytes)`, 'ok');
            $('run').disabled = false;
        } catch (e) {
            setStatus('uploadStatus', e.message, 'err');
        }
    };

    $('run').onclick = async () => {
        try {
            await api('POST', `/sessions/${sessionId}/run`);
            $('log').textContent = '';
            logNext = 0;
            $('run').disabled = true;
            $('cancel').disabled = false;
            $('visualize').disabled = true;
            setStatus('runStatus', 'Solving...');
            polling = setInterval(pollLog, 1000);
        } catch (e) {
            setStatus('runStatus', e.message, 'err');
        }
    };

    $('cancel').onclick = async () => {
        await api('POST', `/sessions/${sessionId}/cancel`);
    };

    async function pollLog() {
        try {
            const data = await api('GET', `/sessions/${sessionId}/log?since=${logNext}`);
            if (data.lines.length) {
                $('log').textContent += data.lines.join('\n') + '\n';
                $('log').scrollTop = $('log').scrollHeight;
            }
            logNext = data.next;
            if (data.job && data.job.state !== 'running') {
                clearInterval(polling);
                finishRun(data.job);
            }
        } catch (e) {
            clearInterval(polling);
            setStatus('runStatus', e.message, 'err');
        }
    }

    function finishRun(job) {
        $('run').disabled = false;
        $('cancel').disabled = true;
        if (job.state === 'exited') {
            setStatus('runStatus', `Solver finished (exit code ${job.code})`, job.code === 0 ? 'ok' : 'err');
            $('visualize').disabled = false;
        } else {
            setStatus('runStatus', `Solver ${job.state.replace('_', ' ')}`, 'err');
        }
    }

    $('visualize').onclick = async () => {
        setStatus('vizStatus', 'Building 3D view...');
        try {
            await api('POST', `/sessions/${sessionId}/visualize`);
            const html = await api('GET', `/sessions/${sessionId}/viewer`);
            const frame = document.createElement('div');
            frame.innerHTML = html;
            // Scripts inserted through innerHTML do not run
            const script = document.createElement('script');
            script.type = 'module';
            script.src = frame.querySelector('script').src;
            document.head.appendChild(script);
            $('viewer').innerHTML = frame.querySelector('.flow-view').innerHTML;
            $('metric').innerHTML = frame.querySelector('.flow-metric').innerHTML;
            $('download').href = `/sessions/${sessionId}/asset.glb`;
            $('download').style.display = 'inline-block';
            setStatus('vizStatus', '', null);
        } catch (e) {
            setStatus('vizStatus', 'Visualization Engine Error: ' + e.message, 'err');
        }
    };
</script>
</body>
</html>
"##;
