use super::{conversion_error, parse_optional_time, parse_time};
use crate::errors::AppResult;
use crate::models::{Membership, MembershipRole, MembershipStatus, ShareLink, SharePermission};
use rusqlite::{params, Connection};

pub fn upsert_membership(conn: &Connection, membership: &Membership) -> AppResult<()> {
    conn.execute(
        "INSERT INTO notebook_memberships (id, notebook_id, user_id, role, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(notebook_id, user_id) DO UPDATE SET
           role = excluded.role,
           status = excluded.status",
        params![
            membership.id,
            membership.notebook_id,
            membership.user_id,
            membership.role.as_str(),
            membership.status.as_str(),
            membership.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn list_memberships(conn: &Connection, notebook_id: &str) -> AppResult<Vec<Membership>> {
    let mut stmt = conn.prepare(
        "SELECT id, notebook_id, user_id, role, status, created_at
         FROM notebook_memberships WHERE notebook_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([notebook_id], |row| {
            Ok(Membership {
                id: row.get(0)?,
                notebook_id: row.get(1)?,
                user_id: row.get(2)?,
                role: parse_role(&row.get::<_, String>(3)?)?,
                status: parse_membership_status(&row.get::<_, String>(4)?)?,
                created_at: parse_time(&row.get::<_, String>(5)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_memberships(conn: &Connection, notebook_id: &str) -> AppResult<usize> {
    Ok(conn.execute(
        "DELETE FROM notebook_memberships WHERE notebook_id = ?1",
        [notebook_id],
    )?)
}

/// Returns false when a link with the same id or token already exists.
pub fn insert_share_link(conn: &Connection, link: &ShareLink) -> AppResult<bool> {
    let inserted = conn.execute(
        "INSERT INTO share_links (id, notebook_id, token, permission, created_by, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT DO NOTHING",
        params![
            link.id,
            link.notebook_id,
            link.token,
            link.permission.as_str(),
            link.created_by,
            link.created_at.to_rfc3339(),
            link.expires_at.map(|value| value.to_rfc3339()),
        ],
    )?;
    Ok(inserted > 0)
}

pub fn list_share_links(conn: &Connection, notebook_id: &str) -> AppResult<Vec<ShareLink>> {
    let mut stmt = conn.prepare(
        "SELECT id, notebook_id, token, permission, created_by, created_at, expires_at
         FROM share_links WHERE notebook_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([notebook_id], |row| {
            Ok(ShareLink {
                id: row.get(0)?,
                notebook_id: row.get(1)?,
                token: row.get(2)?,
                permission: parse_permission(&row.get::<_, String>(3)?)?,
                created_by: row.get(4)?,
                created_at: parse_time(&row.get::<_, String>(5)?)?,
                expires_at: parse_optional_time(row.get(6)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_share_links(conn: &Connection, notebook_id: &str) -> AppResult<usize> {
    Ok(conn.execute("DELETE FROM share_links WHERE notebook_id = ?1", [notebook_id])?)
}

fn parse_role(raw: &str) -> rusqlite::Result<MembershipRole> {
    match raw {
        "owner" => Ok(MembershipRole::Owner),
        "editor" => Ok(MembershipRole::Editor),
        "viewer" => Ok(MembershipRole::Viewer),
        other => Err(conversion_error(format!("Unknown membership role '{}'", other))),
    }
}

fn parse_membership_status(raw: &str) -> rusqlite::Result<MembershipStatus> {
    match raw {
        "active" => Ok(MembershipStatus::Active),
        "invited" => Ok(MembershipStatus::Invited),
        "revoked" => Ok(MembershipStatus::Revoked),
        other => Err(conversion_error(format!("Unknown membership status '{}'", other))),
    }
}

fn parse_permission(raw: &str) -> rusqlite::Result<SharePermission> {
    match raw {
        "view" => Ok(SharePermission::View),
        "edit" => Ok(SharePermission::Edit),
        other => Err(conversion_error(format!("Unknown share permission '{}'", other))),
    }
}
