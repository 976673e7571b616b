use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Expected tables of the demo dataset and their row counts.
const SEED_TABLES: &[SeedTableContract] = &[
    SeedTableContract {
        name: "departments",
        expected_rows: 4,
        description: "Academic departments",
    },
    SeedTableContract { name: "majors", expected_rows: 5, description: "Majors offered per department" },
    SeedTableContract { name: "students", expected_rows: 12, description: "Students with major and GPA" },
    SeedTableContract { name: "courses", expected_rows: 8, description: "Courses per department" },
    SeedTableContract {
        name: "enrollments",
        expected_rows: 18,
        description: "Student course enrollments",
    },
];

/// Deterministic university dataset used as a demo target database.
pub struct UniversityDataset;

impl UniversityDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/university_seed.sql");

    /// Creates the demo tables if needed and inserts the rows. Loading twice
    /// leaves the data unchanged.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        let tables_seeded = SEED_TABLES
            .iter()
            .map(|table| TableSeedInfo {
                table: table.name,
                rows: table.expected_rows,
                description: table.description,
            })
            .collect();

        Ok(SeedResult { tables_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for table in SEED_TABLES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            )
            .bind(table.name)
            .fetch_one(pool)
            .await?;
            if exists == 0 {
                checks.push((table.name, false));
                continue;
            }

            let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {}", table.name))
                .fetch_one(pool)
                .await?;
            checks.push((table.name, rows == table.expected_rows));
        }

        let orphans: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM enrollments e
             LEFT JOIN students s ON s.id = e.student_id
             LEFT JOIN courses c ON c.id = e.course_id
             WHERE s.id IS NULL OR c.id IS NULL",
        )
        .fetch_one(pool)
        .await
        .unwrap_or(-1);
        checks.push(("enrollment-references", orphans == 0));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Drops the demo tables, children first.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for table in SEED_TABLES.iter().rev() {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table.name)).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedTableContract {
    name: &'static str,
    expected_rows: i64,
    description: &'static str,
}

#[derive(Debug)]
pub struct SeedResult {
    pub tables_seeded: Vec<TableSeedInfo>,
}

#[derive(Debug)]
pub struct TableSeedInfo {
    pub table: &'static str,
    pub rows: i64,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
