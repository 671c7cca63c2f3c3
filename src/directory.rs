use sqlx::{FromRow, MySqlPool};

use crate::model::attendance::EmployeeSnapshot;

#[derive(FromRow)]
struct SnapshotRow {
    first_name: String,
    last_name: String,
    email: String,
    employee_code: String,
    department: Option<String>,
}

/// Profile fields to copy onto a check-in. `None` when the employee does
/// not exist or is not active.
pub async fn employee_snapshot(
    pool: &MySqlPool,
    employee_id: u64,
) -> Result<Option<EmployeeSnapshot>, sqlx::Error> {
    let row = sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT e.first_name, e.last_name, e.email, e.employee_code,
               d.name AS department
        FROM employees e
        LEFT JOIN departments d ON d.id = e.department_id
        WHERE e.id = ?
        AND e.status = 'active'
        "#,
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| EmployeeSnapshot {
        name: display_name(&r.first_name, &r.last_name),
        email: r.email,
        department: r.department.unwrap_or_default(),
        employee_code: r.employee_code,
    }))
}

fn display_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::display_name;

    #[test]
    fn display_name_skips_missing_parts() {
        assert_eq!(display_name("John", "Doe"), "John Doe");
        assert_eq!(display_name(" Madonna ", ""), "Madonna");
    }
}
