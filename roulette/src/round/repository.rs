//! SQL for rounds, bets, outcomes and draws.
//!
//! Every function runs on a borrowed connection so the round machine can
//! compose them inside one transaction.
#![allow(clippy::needless_raw_string_hashes)]

use super::models::{Bet, DrawRecord, Outcome, Round};
use crate::fairness::{Draw, StoppingValue};
use crate::wheel::Color;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

/// Advisory lock key serializing round creation and rolls
const ROUND_LOCK_KEY: i64 = 0x5255_4c45_5454_45;

const ROUND_COLUMNS: &str = "id, external_id, sequence, played_at, created_at";

/// Block until this transaction holds the round lock. Released on commit or
/// rollback; re-entrant within one transaction.
pub async fn lock_rounds(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ROUND_LOCK_KEY)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Highest persisted sequence, 0 when no round exists
pub async fn last_sequence(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COALESCE(MAX(sequence), 0) AS last FROM rounds")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get("last"))
}

pub async fn insert_round(conn: &mut PgConnection, sequence: i64) -> Result<Round, sqlx::Error> {
    let row = sqlx::query(&format!(
        "INSERT INTO rounds (external_id, sequence) VALUES ($1, $2) RETURNING {ROUND_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(sequence)
    .fetch_one(&mut *conn)
    .await?;
    Ok(round_from_row(&row))
}

pub async fn find_round(
    conn: &mut PgConnection,
    external_id: Uuid,
) -> Result<Option<Round>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {ROUND_COLUMNS} FROM rounds WHERE external_id = $1"
    ))
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.as_ref().map(round_from_row))
}

/// Find a round and hold a share lock on it, so a concurrent roll cannot
/// close it until this transaction ends
pub async fn find_round_for_bets(
    conn: &mut PgConnection,
    external_id: Uuid,
) -> Result<Option<Round>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {ROUND_COLUMNS} FROM rounds WHERE external_id = $1 FOR SHARE"
    ))
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.as_ref().map(round_from_row))
}

/// Round immediately before `sequence`, locked for update
pub async fn previous_round(
    conn: &mut PgConnection,
    sequence: i64,
) -> Result<Option<Round>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {ROUND_COLUMNS} FROM rounds
         WHERE sequence < $1
         ORDER BY sequence DESC
         LIMIT 1
         FOR UPDATE"
    ))
    .bind(sequence)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.as_ref().map(round_from_row))
}

/// Set the settled marker; returns the updated round
pub async fn mark_played(conn: &mut PgConnection, round_id: i64) -> Result<Round, sqlx::Error> {
    let row = sqlx::query(&format!(
        "UPDATE rounds SET played_at = NOW(), updated_at = NOW()
         WHERE id = $1
         RETURNING {ROUND_COLUMNS}"
    ))
    .bind(round_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(round_from_row(&row))
}

pub async fn count_bets(
    conn: &mut PgConnection,
    round_id: i64,
    user_id: i64,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM bets WHERE round_id = $1 AND user_id = $2")
        .bind(round_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get("count"))
}

pub async fn insert_bet(
    conn: &mut PgConnection,
    round_id: i64,
    user_id: i64,
    color: Color,
    amount: i64,
) -> Result<Bet, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO bets (color, amount, round_id, user_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id, round_id, user_id, color, amount, created_at
        "#,
    )
    .bind(color.as_str())
    .bind(amount)
    .bind(round_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    bet_from_row(&row)
}

/// Bets on `round_id` that picked `color`, in placement order
pub async fn winning_bets(
    conn: &mut PgConnection,
    round_id: i64,
    color: Color,
) -> Result<Vec<Bet>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, round_id, user_id, color, amount, created_at
        FROM bets
        WHERE round_id = $1 AND color = $2
        ORDER BY id
        "#,
    )
    .bind(round_id)
    .bind(color.as_str())
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(bet_from_row).collect()
}

pub async fn draw_exists(conn: &mut PgConnection, round_id: i64) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM draws WHERE round_id = $1) AS found")
        .bind(round_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get("found"))
}

pub async fn insert_outcome(
    conn: &mut PgConnection,
    round_id: i64,
    color: Color,
    number: u8,
) -> Result<Outcome, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO outcomes (color, round_id, number)
        VALUES ($1, $2, $3)
        RETURNING round_id, color, number, created_at
        "#,
    )
    .bind(color.as_str())
    .bind(round_id)
    .bind(i16::from(number))
    .fetch_one(&mut *conn)
    .await?;

    Ok(Outcome {
        round_id: row.get("round_id"),
        color: decode_color(row.get("color"))?,
        number: decode_number(row.get("number"))?,
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    })
}

/// Persist the draw and its provably fair record; returns the draw id
pub async fn insert_draw(
    conn: &mut PgConnection,
    round_id: i64,
    game_tag: &str,
    draw: &Draw,
) -> Result<i64, sqlx::Error> {
    let draw_id: i64 = sqlx::query(
        "INSERT INTO draws (round_id, game_tag) VALUES ($1, $2) RETURNING id",
    )
    .bind(round_id)
    .bind(game_tag)
    .fetch_one(&mut *conn)
    .await?
    .get("id");

    let nonce = i64::try_from(draw.nonce)
        .map_err(|_| sqlx::Error::Encode(format!("nonce {} out of range", draw.nonce).into()))?;

    sqlx::query(
        r#"
        INSERT INTO provably_fair_records
            (draw_id, algorithm, client_seed, server_seed, result_hash, result_value, min, max, nonce)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(draw_id)
    .bind(&draw.algorithm)
    .bind(&draw.client_seed)
    .bind(&draw.server_seed)
    .bind(&draw.result_hash)
    .bind(draw.stopping_value.as_f64())
    .bind(draw.min as i32)
    .bind(draw.max as i32)
    .bind(nonce)
    .execute(&mut *conn)
    .await?;

    Ok(draw_id)
}

/// Full audit record for a rolled round
pub async fn find_draw_record(
    pool: &PgPool,
    external_id: Uuid,
) -> Result<Option<DrawRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT r.external_id, r.sequence, d.game_tag, d.created_at,
               o.color, o.number,
               p.algorithm, p.client_seed, p.server_seed, p.result_hash,
               p.result_value, p.min, p.max, p.nonce
        FROM rounds r
        JOIN draws d ON d.round_id = r.id
        JOIN outcomes o ON o.round_id = r.id
        JOIN provably_fair_records p ON p.draw_id = d.id
        WHERE r.external_id = $1
        "#,
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let value: f64 = row.get("result_value");
    let stopping_value = StoppingValue::from_hundredths((value * 100.0).round() as u32)
        .ok_or_else(|| sqlx::Error::Decode(format!("stopping value {value} out of range").into()))?;
    let nonce: i64 = row.get("nonce");

    Ok(Some(DrawRecord {
        round: row.get("external_id"),
        sequence: row.get("sequence"),
        game_tag: row.get("game_tag"),
        color: decode_color(row.get("color"))?,
        number: decode_number(row.get("number"))?,
        draw: Draw {
            algorithm: row.get("algorithm"),
            client_seed: row.get("client_seed"),
            server_seed: row.get("server_seed"),
            result_hash: row.get("result_hash"),
            nonce: nonce as u64,
            stopping_value,
            min: row.get::<i32, _>("min") as u32,
            max: row.get::<i32, _>("max") as u32,
        },
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    }))
}

/// Nonce the generator should resume at: one past the highest persisted
pub async fn next_nonce(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let row = sqlx::query("SELECT COALESCE(MAX(nonce) + 1, 0) AS next FROM provably_fair_records")
        .fetch_one(pool)
        .await?;
    Ok(u64::try_from(row.get::<i64, _>("next")).unwrap_or(0))
}

fn round_from_row(row: &PgRow) -> Round {
    Round {
        id: row.get("id"),
        external_id: row.get("external_id"),
        sequence: row.get("sequence"),
        played_at: row
            .get::<Option<chrono::NaiveDateTime>, _>("played_at")
            .map(|dt| dt.and_utc()),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    }
}

fn bet_from_row(row: &PgRow) -> Result<Bet, sqlx::Error> {
    Ok(Bet {
        id: row.get("id"),
        round_id: row.get("round_id"),
        user_id: row.get("user_id"),
        color: decode_color(row.get("color"))?,
        amount: row.get("amount"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    })
}

fn decode_color(value: &str) -> Result<Color, sqlx::Error> {
    value.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn decode_number(value: i16) -> Result<u8, sqlx::Error> {
    u8::try_from(value)
        .map_err(|_| sqlx::Error::Decode(format!("pocket number {value} out of range").into()))
}
