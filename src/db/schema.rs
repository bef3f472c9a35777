use rusqlite::Connection;

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            discord_id TEXT NOT NULL UNIQUE,
            username TEXT NOT NULL,
            avatar TEXT,
            points INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
            role TEXT NOT NULL DEFAULT 'user',
            permissions TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

        CREATE TABLE IF NOT EXISTS scripts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            resource_name TEXT NOT NULL,
            price INTEGER NOT NULL CHECK (price >= 0),
            description TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cart_items (
            user_id TEXT NOT NULL,
            script_id TEXT NOT NULL,
            added_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, script_id)
        );

        CREATE TABLE IF NOT EXISTS funding_intents (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            method TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            amount INTEGER NOT NULL CHECK (amount > 0),
            requested_amount INTEGER NOT NULL CHECK (requested_amount > 0),
            points_to_credit INTEGER NOT NULL CHECK (points_to_credit >= 1),
            reference TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            expires_at INTEGER,
            resolved_at INTEGER,
            approver_id TEXT,
            review_note TEXT,
            evidence_url TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_funding_intents_user ON funding_intents(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_funding_intents_status ON funding_intents(status, expires_at);

        CREATE TABLE IF NOT EXISTS point_entries (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            delta INTEGER NOT NULL,
            balance_after INTEGER NOT NULL CHECK (balance_after >= 0),
            reason TEXT NOT NULL,
            intent_id TEXT UNIQUE,
            actor_id TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_point_entries_user ON point_entries(user_id, created_at);

        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            script_id TEXT NOT NULL,
            license_key TEXT NOT NULL UNIQUE,
            price_paid INTEGER NOT NULL,
            bound_server_address TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_user ON licenses(user_id, created_at);
        ",
    )
}

pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_id TEXT,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            details TEXT,
            ip_address TEXT,
            user_agent TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_resource ON audit_logs(resource_type, resource_id);
        ",
    )
}
