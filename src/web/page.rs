//! Landing page served at `/`

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>🐱 CatSpy Live</title>
    <style>
        body {
            margin: 0;
            font-family: system-ui, sans-serif;
            background: #121212;
            color: #fff;
            display: flex;
            flex-direction: column;
            align-items: center;
            justify-content: center;
            min-height: 100vh;
            text-align: center;
        }
        h2 { margin-bottom: 20px; font-size: 2rem; color: #f5c542; }
        img {
            width: 90vw;
            max-width: 640px;
            border-radius: 12px;
            box-shadow: 0 0 20px rgba(255, 255, 255, 0.1);
        }
        button {
            margin-top: 20px;
            padding: 12px 24px;
            font-size: 1rem;
            background: #e74c3c;
            color: #fff;
            border: none;
            border-radius: 8px;
            cursor: pointer;
        }
        button:hover { background: #c0392b; }
        @media (max-width: 480px) {
            h2 { font-size: 1.5rem; }
            button { width: 80%; }
        }
    </style>
</head>
<body>
    <h2>🐱 CatSpy Live</h2>
    <img src="/video" alt="Live stream" />
    <form action="/stop" method="post">
        <button type="submit">🛑 Stop Stream</button>
    </form>
</body>
</html>
"#;
