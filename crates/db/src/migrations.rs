// crates/db/src/migrations.rs
//! Inline migrations: schema, indexes, and the stored functions that carry
//! the atomic task/XP/session operations.
//!
//! Entries run in order exactly once, tracked by the `_migrations` table
//! (see `run_migrations` in `lib.rs`). Multi-statement entries are executed
//! with `raw_sql`, so each entry may contain several statements.

pub const MIGRATIONS: &[&str] = &[
    // 1. Accounts and auth sessions.
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        email TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        level BIGINT NOT NULL DEFAULT 1 CHECK (level >= 1),
        exp BIGINT NOT NULL DEFAULT 0 CHECK (exp >= 0),
        created_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT
    );
    CREATE TABLE IF NOT EXISTS passwords (
        user_id UUID PRIMARY KEY REFERENCES users(user_id) ON DELETE CASCADE,
        email TEXT NOT NULL UNIQUE,
        hashed_password TEXT NOT NULL,
        salt TEXT NOT NULL,
        sso_provider TEXT,
        sso_token TEXT,
        created_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT,
        updated_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT
    );
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        created_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT,
        expires_at BIGINT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        CHECK (expires_at > created_at)
    );
    "#,
    // 2. Word catalog and per-user wrong words.
    r#"
    CREATE TABLE IF NOT EXISTS words (
        word_id BIGINT PRIMARY KEY CHECK (word_id BETWEEN 19968 AND 40959),
        word TEXT NOT NULL,
        description TEXT,
        image_url TEXT,
        pronunciation_url TEXT,
        strokes_url TEXT,
        created_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT
    );
    CREATE TABLE IF NOT EXISTS past_wrong_words (
        item_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        word_id BIGINT NOT NULL REFERENCES words(word_id),
        wrong_count BIGINT NOT NULL DEFAULT 1 CHECK (wrong_count >= 1),
        wrong_image_url TEXT,
        last_wrong_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT,
        UNIQUE (user_id, word_id)
    );
    "#,
    // 3. Questions and the flag suppression set.
    r#"
    CREATE TABLE IF NOT EXISTS questions (
        question_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        question_type TEXT NOT NULL,
        answer_type TEXT NOT NULL,
        given_material JSONB,
        target_word_id BIGINT NOT NULL REFERENCES words(word_id),
        prompt TEXT NOT NULL DEFAULT '',
        mc_choices JSONB,
        mc_answers JSONB,
        pairs JSONB,
        pairing_display JSONB,
        handwrite_target TEXT,
        background_image_url TEXT,
        created_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT,
        use_count BIGINT NOT NULL DEFAULT 0 CHECK (use_count >= 0),
        correct_count BIGINT NOT NULL DEFAULT 0
            CHECK (correct_count >= 0 AND correct_count <= use_count)
    );
    CREATE TABLE IF NOT EXISTS flagged_questions (
        flag_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        question_id UUID NOT NULL REFERENCES questions(question_id) ON DELETE CASCADE,
        user_id UUID NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        reason TEXT,
        notes TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT
    );
    "#,
    // 4. Game sessions, results, and per-question history.
    r#"
    CREATE TABLE IF NOT EXISTS game_sessions (
        game_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        question_ids JSONB NOT NULL,
        start_time BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT,
        status TEXT NOT NULL DEFAULT 'in_progress'
    );
    CREATE TABLE IF NOT EXISTS game_data (
        game_id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        created_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT,
        earned_exp BIGINT NOT NULL DEFAULT 0 CHECK (earned_exp >= 0),
        time_spent BIGINT NOT NULL DEFAULT 0 CHECK (time_spent >= 0),
        total_score BIGINT NOT NULL DEFAULT 0 CHECK (total_score >= 0),
        question_count BIGINT NOT NULL DEFAULT 0 CHECK (question_count >= 0),
        remaining_hearts BIGINT NOT NULL DEFAULT 3,
        correct_count BIGINT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS game_qa_history (
        game_id UUID NOT NULL,
        user_id UUID NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        question_id UUID NOT NULL,
        question_index BIGINT NOT NULL,
        answer JSONB NOT NULL,
        is_correct BOOLEAN NOT NULL,
        PRIMARY KEY (game_id, question_index)
    );
    "#,
    // 5. Tasks and user settings.
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        task_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        task_class TEXT NOT NULL DEFAULT 'daily',
        type TEXT NOT NULL DEFAULT 'daily_adventure',
        created_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT,
        until BIGINT,
        status TEXT NOT NULL DEFAULT 'ongoing',
        title TEXT NOT NULL DEFAULT '',
        content JSONB,
        priority BIGINT NOT NULL DEFAULT 50,
        completed_at BIGINT,
        exp BIGINT NOT NULL DEFAULT 10,
        target BIGINT,
        progress BIGINT
    );
    CREATE TABLE IF NOT EXISTS user_settings (
        user_id UUID PRIMARY KEY REFERENCES users(user_id) ON DELETE CASCADE,
        language TEXT NOT NULL DEFAULT 'zh-hk',
        theme TEXT,
        settings JSONB NOT NULL DEFAULT '{}'::jsonb,
        updated_at BIGINT NOT NULL DEFAULT EXTRACT(epoch FROM now())::BIGINT
    );
    "#,
    // 6. Indexes on the hot paths.
    r#"
    CREATE INDEX IF NOT EXISTS idx_questions_word_created
        ON questions (target_word_id, created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_flagged_questions_question
        ON flagged_questions (question_id);
    CREATE INDEX IF NOT EXISTS idx_pww_user ON past_wrong_words (user_id, last_wrong_at DESC);
    CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions (is_active, expires_at);
    CREATE INDEX IF NOT EXISTS idx_game_sessions_status ON game_sessions (status, start_time);
    CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks (user_id, status, priority DESC);
    "#,
    // 7. XP: atomic increment plus level recompute.
    r#"
    CREATE OR REPLACE FUNCTION update_user_experience(p_user_id UUID, p_gained_exp BIGINT)
    RETURNS TABLE(new_exp BIGINT, new_level BIGINT) AS $fn$
        UPDATE users u
        SET exp = u.exp + p_gained_exp,
            level = GREATEST(1, FLOOR(POWER((u.exp + p_gained_exp) / 10.0, 1.0 / 1.5))::BIGINT)
        WHERE u.user_id = p_user_id
        RETURNING u.exp, u.level;
    $fn$ LANGUAGE sql;
    "#,
    // 8. Daily tasks: create today's (UTC+8 calendar day) daily task when
    // missing, return ongoing or completed-today tasks by priority.
    r#"
    CREATE OR REPLACE FUNCTION get_or_create_today_tasks(p_user_id UUID)
    RETURNS SETOF tasks AS $fn$
    DECLARE
        today TEXT := to_char(now() AT TIME ZONE 'Asia/Shanghai', 'YYYY-MM-DD');
        day_end BIGINT := EXTRACT(epoch FROM
            (date_trunc('day', now() AT TIME ZONE 'Asia/Shanghai')
             + interval '1 day' - interval '1 second') AT TIME ZONE 'Asia/Shanghai')::BIGINT;
    BEGIN
        IF NOT EXISTS (
            SELECT 1 FROM tasks t
            WHERE t.user_id = p_user_id
              AND t.task_class = 'daily'
              AND to_char(to_timestamp(t.created_at) AT TIME ZONE 'Asia/Shanghai',
                          'YYYY-MM-DD') = today
        ) THEN
            INSERT INTO tasks
                (user_id, task_class, type, title, content,
                 priority, until, status, exp, target, progress)
            VALUES
                (p_user_id, 'daily', 'daily_adventure', '每日任務: 完成一次冒險探索',
                 jsonb_build_object('description', '每日任務: 完成一次冒險探索'),
                 100, day_end, 'ongoing', 10, 1, 0);
        END IF;
        RETURN QUERY
            SELECT * FROM tasks t
            WHERE t.user_id = p_user_id
              AND (t.status = 'ongoing'
                   OR (t.status = 'completed'
                       AND t.completed_at IS NOT NULL
                       AND to_char(to_timestamp(t.completed_at) AT TIME ZONE 'Asia/Shanghai',
                                   'YYYY-MM-DD') = today))
            ORDER BY t.priority DESC
            LIMIT 100;
    END;
    $fn$ LANGUAGE plpgsql;
    "#,
    // 9. Task progress: the ongoing→completed transition grants XP exactly
    // once; repeat calls update progress but grant nothing.
    r#"
    CREATE OR REPLACE FUNCTION set_task_progress(p_user_id UUID, p_task_id UUID, p_progress BIGINT)
    RETURNS TABLE(updated BOOLEAN, granted_exp BIGINT) AS $fn$
    DECLARE
        v_task tasks%ROWTYPE;
        v_granted BIGINT := 0;
    BEGIN
        UPDATE tasks t SET progress = p_progress
        WHERE t.task_id = p_task_id AND t.user_id = p_user_id
        RETURNING t.* INTO v_task;
        IF NOT FOUND THEN
            RETURN QUERY SELECT FALSE, 0::BIGINT;
            RETURN;
        END IF;
        IF v_task.status = 'ongoing'
           AND v_task.target IS NOT NULL
           AND p_progress >= v_task.target THEN
            UPDATE tasks t
            SET status = 'completed',
                completed_at = EXTRACT(epoch FROM now())::BIGINT
            WHERE t.task_id = p_task_id AND t.status = 'ongoing';
            IF FOUND THEN
                v_granted := v_task.exp;
                PERFORM update_user_experience(p_user_id, v_task.exp);
            END IF;
        END IF;
        RETURN QUERY SELECT TRUE, v_granted;
    END;
    $fn$ LANGUAGE plpgsql;
    "#,
    // 10. Wrong-word increments for existing rows only.
    r#"
    CREATE OR REPLACE FUNCTION increment_wrong_count_for_user(p_user_id UUID, p_word_ids BIGINT[])
    RETURNS BIGINT AS $fn$
        WITH bumped AS (
            UPDATE past_wrong_words w
            SET wrong_count = w.wrong_count + 1,
                last_wrong_at = EXTRACT(epoch FROM now())::BIGINT
            WHERE w.user_id = p_user_id AND w.word_id = ANY(p_word_ids)
            RETURNING 1
        )
        SELECT count(*) FROM bumped;
    $fn$ LANGUAGE sql;
    "#,
    // 11. Idempotent user creation keyed on email.
    r#"
    CREATE OR REPLACE FUNCTION add_new_user(p_name TEXT, p_email TEXT)
    RETURNS TABLE(user_id UUID, email TEXT, name TEXT, level BIGINT, exp BIGINT,
                  created_at BIGINT, existed BOOLEAN) AS $fn$
    DECLARE
        v_user users%ROWTYPE;
    BEGIN
        SELECT * INTO v_user FROM users u WHERE u.email = p_email;
        IF FOUND THEN
            RETURN QUERY SELECT v_user.user_id, v_user.email, v_user.name,
                                v_user.level, v_user.exp, v_user.created_at, TRUE;
            RETURN;
        END IF;
        BEGIN
            INSERT INTO users (name, email) VALUES (p_name, p_email)
            RETURNING * INTO v_user;
        EXCEPTION WHEN unique_violation THEN
            SELECT * INTO v_user FROM users u WHERE u.email = p_email;
            RETURN QUERY SELECT v_user.user_id, v_user.email, v_user.name,
                                v_user.level, v_user.exp, v_user.created_at, TRUE;
            RETURN;
        END;
        RETURN QUERY SELECT v_user.user_id, v_user.email, v_user.name,
                            v_user.level, v_user.exp, v_user.created_at, FALSE;
    END;
    $fn$ LANGUAGE plpgsql;
    "#,
    // 12. Session sweeps.
    r#"
    CREATE OR REPLACE FUNCTION cleanup_game_sessions()
    RETURNS TABLE(abandoned_count BIGINT, deleted_count BIGINT) AS $fn$
        WITH stale AS (
            UPDATE game_sessions s SET status = 'abandoned'
            WHERE s.status = 'in_progress'
              AND s.start_time < EXTRACT(epoch FROM now())::BIGINT - 86400
            RETURNING 1
        ), old AS (
            DELETE FROM game_sessions s
            WHERE s.status IN ('completed', 'abandoned')
              AND s.start_time < EXTRACT(epoch FROM now())::BIGINT - 2592000
            RETURNING 1
        )
        SELECT (SELECT count(*) FROM stale), (SELECT count(*) FROM old);
    $fn$ LANGUAGE sql;

    CREATE OR REPLACE FUNCTION cleanup_auth_sessions()
    RETURNS TABLE(expired_count BIGINT, deleted_count BIGINT) AS $fn$
        WITH expired AS (
            UPDATE sessions s SET is_active = FALSE
            WHERE s.is_active
              AND s.expires_at < EXTRACT(epoch FROM now())::BIGINT
            RETURNING 1
        ), purged AS (
            DELETE FROM sessions s
            WHERE s.is_active = FALSE
              AND s.expires_at < EXTRACT(epoch FROM now())::BIGINT - 2592000
            RETURNING 1
        )
        SELECT (SELECT count(*) FROM expired), (SELECT count(*) FROM purged);
    $fn$ LANGUAGE sql;
    "#,
    // 13. Wrong-word reads.
    r#"
    CREATE OR REPLACE FUNCTION get_past_wrong_words_by_user(p_user_id UUID, p_limit BIGINT, p_offset BIGINT)
    RETURNS TABLE(word_id BIGINT, word TEXT, description TEXT, image_url TEXT,
                  pronunciation_url TEXT, strokes_url TEXT, wrong_count BIGINT,
                  wrong_image_url TEXT, last_wrong_at BIGINT, created_at BIGINT) AS $fn$
        SELECT w.word_id, w.word, w.description, w.image_url,
               w.pronunciation_url, w.strokes_url, p.wrong_count,
               p.wrong_image_url, p.last_wrong_at, w.created_at
        FROM past_wrong_words p
        JOIN words w ON w.word_id = p.word_id
        WHERE p.user_id = p_user_id
        ORDER BY p.last_wrong_at DESC
        LIMIT p_limit OFFSET p_offset;
    $fn$ LANGUAGE sql;

    CREATE OR REPLACE FUNCTION get_wrong_words_by_user_after(provided_user_id UUID, provided_timestamp BIGINT, target_word_id BIGINT)
    RETURNS TABLE(word_id BIGINT, wrong_count BIGINT, last_wrong_at BIGINT) AS $fn$
        SELECT p.word_id, p.wrong_count, p.last_wrong_at
        FROM past_wrong_words p
        WHERE p.user_id = provided_user_id
          AND p.last_wrong_at >= provided_timestamp
          AND (target_word_id = 0 OR p.word_id = target_word_id);
    $fn$ LANGUAGE sql;

    CREATE OR REPLACE FUNCTION get_existing_wrong_word_ids(p_user_id UUID, p_word_ids BIGINT[])
    RETURNS SETOF past_wrong_words AS $fn$
        SELECT * FROM past_wrong_words p
        WHERE p.user_id = p_user_id AND p.word_id = ANY(p_word_ids);
    $fn$ LANGUAGE sql;
    "#,
    // 14. Question statistics and type counts.
    r#"
    CREATE OR REPLACE FUNCTION update_question_stats(p_answered UUID[], p_wrong UUID[])
    RETURNS TABLE(answered_count BIGINT, wrong_count BIGINT) AS $fn$
        WITH used AS (
            UPDATE questions q
            SET use_count = q.use_count + 1,
                correct_count = q.correct_count
                    + CASE WHEN q.question_id = ANY(p_wrong) THEN 0 ELSE 1 END
            WHERE q.question_id = ANY(p_answered)
            RETURNING 1
        )
        SELECT (SELECT count(*) FROM used),
               (SELECT COALESCE(cardinality(p_wrong), 0)::BIGINT);
    $fn$ LANGUAGE sql;

    CREATE OR REPLACE FUNCTION count_question_types(p_word_id BIGINT)
    RETURNS TABLE(question_type TEXT, count BIGINT) AS $fn$
        SELECT q.question_type, count(*)
        FROM questions q
        WHERE p_word_id = 0 OR q.target_word_id = p_word_id
        GROUP BY q.question_type;
    $fn$ LANGUAGE sql;
    "#,
    // 15. Word catalog reads.
    r#"
    CREATE OR REPLACE FUNCTION get_random_words(p_count BIGINT)
    RETURNS SETOF words AS $fn$
        SELECT * FROM words ORDER BY random() LIMIT p_count;
    $fn$ LANGUAGE sql;

    CREATE OR REPLACE FUNCTION get_existing_words(p_word_ids BIGINT[])
    RETURNS SETOF words AS $fn$
        SELECT * FROM words w WHERE w.word_id = ANY(p_word_ids);
    $fn$ LANGUAGE sql;
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_contracted_function_is_created() {
        let all = MIGRATIONS.join("\n");
        for name in [
            "update_user_experience",
            "get_or_create_today_tasks",
            "set_task_progress",
            "increment_wrong_count_for_user",
            "add_new_user",
            "cleanup_game_sessions",
            "cleanup_auth_sessions",
            "get_past_wrong_words_by_user",
            "get_wrong_words_by_user_after",
            "update_question_stats",
            "count_question_types",
            "get_random_words",
            "get_existing_words",
            "get_existing_wrong_word_ids",
        ] {
            assert!(
                all.contains(&format!("FUNCTION {name}(")),
                "missing stored function {name}"
            );
        }
    }

    #[test]
    fn test_every_table_is_created() {
        let all = MIGRATIONS.join("\n");
        for table in [
            "users",
            "passwords",
            "sessions",
            "words",
            "past_wrong_words",
            "questions",
            "game_data",
            "game_qa_history",
            "game_sessions",
            "tasks",
            "user_settings",
            "flagged_questions",
        ] {
            assert!(
                all.contains(&format!("CREATE TABLE IF NOT EXISTS {table} ")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn test_json_columns_are_jsonb() {
        let all = MIGRATIONS.join("\n");
        for column in [
            "given_material JSONB",
            "mc_choices JSONB",
            "mc_answers JSONB",
            "pairs JSONB",
            "question_ids JSONB",
            "answer JSONB",
            "content JSONB",
            "settings JSONB",
        ] {
            assert!(all.contains(column), "expected JSONB column: {column}");
        }
    }
}
