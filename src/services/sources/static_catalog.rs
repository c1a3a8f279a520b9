/// Built-in catalog used until real book and article search backends are wired in
///
/// Books come from a few hand-picked shelves matched by keyword (Chinese or English);
/// queries matching no shelf get a single placeholder pointing at Douban search.
/// Articles are templated per outlet for the requested language.
use crate::{
    error::{AppError, AppResult},
    models::{CandidateItem, ContentType, ItemType, Language},
    services::sources::CandidateSource,
};

const ARTICLES_PER_QUERY: usize = 3;

struct Shelf {
    keywords: &'static [&'static str],
    books: &'static [StaticBook],
}

struct StaticBook {
    title: &'static str,
    author: &'static str,
    description: &'static str,
    url: &'static str,
}

struct Outlet {
    name: &'static str,
    domain: &'static str,
}

const BOOK_SOURCE: &str = "豆瓣读书";

const SHELVES: &[Shelf] = &[
    Shelf {
        keywords: &["机器学习", "machine learning"],
        books: &[
            StaticBook {
                title: "机器学习",
                author: "周志华",
                description: "机器学习领域的经典教材，系统全面地介绍了机器学习的基本概念、原理和方法。",
                url: "https://book.douban.com/subject/26708119/",
            },
            StaticBook {
                title: "Python机器学习",
                author: "Sebastian Raschka",
                description: "通过Python实践机器学习，适合初学者入门。",
                url: "https://book.douban.com/subject/27000110/",
            },
            StaticBook {
                title: "统计学习方法",
                author: "李航",
                description: "统计学习方法的经典著作，深入浅出地介绍了各种算法。",
                url: "https://book.douban.com/subject/10590856/",
            },
        ],
    },
    Shelf {
        keywords: &["小说", "fiction"],
        books: &[
            StaticBook {
                title: "三体",
                author: "刘慈欣",
                description: "中国科幻文学的里程碑之作，讲述了人类文明与外星文明的碰撞。",
                url: "https://book.douban.com/subject/2567698/",
            },
            StaticBook {
                title: "百年孤独",
                author: "加西亚·马尔克斯",
                description: "魔幻现实主义的代表作，讲述了布恩迪亚家族七代人的传奇故事。",
                url: "https://book.douban.com/subject/6082808/",
            },
        ],
    },
    Shelf {
        keywords: &["心理", "psychology"],
        books: &[
            StaticBook {
                title: "思考，快与慢",
                author: "丹尼尔·卡尼曼",
                description: "诺贝尔经济学奖得主的经典著作，揭示了人类思维的两种模式。",
                url: "https://book.douban.com/subject/10785583/",
            },
            StaticBook {
                title: "心理学与生活",
                author: "理查德·格里格",
                description: "心理学入门的经典教材，生动有趣地介绍了心理学的各个领域。",
                url: "https://book.douban.com/subject/1032501/",
            },
        ],
    },
];

const ZH_OUTLETS: &[Outlet] = &[
    Outlet { name: "知乎专栏", domain: "zhuanlan.zhihu.com" },
    Outlet { name: "少数派", domain: "sspai.com" },
    Outlet { name: "InfoQ", domain: "infoq.cn" },
    Outlet { name: "机器之心", domain: "jiqizhixin.com" },
];

const EN_OUTLETS: &[Outlet] = &[
    Outlet { name: "Medium", domain: "medium.com" },
    Outlet { name: "Towards Data Science", domain: "towardsdatascience.com" },
    Outlet { name: "ArXiv", domain: "arxiv.org" },
];

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog;

impl StaticCatalog {
    pub fn new() -> Self {
        Self
    }

    fn search_books(&self, query: &str) -> Vec<CandidateItem> {
        let lowered = query.to_lowercase();

        let mut books: Vec<CandidateItem> = SHELVES
            .iter()
            .filter(|shelf| shelf.keywords.iter().any(|k| lowered.contains(k)))
            .flat_map(|shelf| shelf.books.iter())
            .map(|book| CandidateItem {
                title: book.title.to_string(),
                author: book.author.to_string(),
                description: book.description.to_string(),
                url: book.url.to_string(),
                source: BOOK_SOURCE.to_string(),
                item_type: ItemType::Book,
            })
            .collect();

        if books.is_empty() {
            books.push(CandidateItem {
                title: format!("关于{}的推荐书籍", query),
                author: "待查询".to_string(),
                description: format!(
                    "这是一本关于{}的优质书籍，建议通过豆瓣或其他平台搜索更多信息。",
                    query
                ),
                url: "https://book.douban.com/".to_string(),
                source: BOOK_SOURCE.to_string(),
                item_type: ItemType::Book,
            });
        }

        books
    }

    fn search_articles(&self, query: &str, language: Language) -> Vec<CandidateItem> {
        let outlets = match language {
            Language::Zh => ZH_OUTLETS,
            Language::En => EN_OUTLETS,
        };

        outlets
            .iter()
            .take(ARTICLES_PER_QUERY)
            .map(|outlet| CandidateItem {
                title: format!("{}相关文章 - {}", query, outlet.name),
                author: "专栏作者".to_string(),
                description: format!("这是一篇关于{}的深度文章，来自{}。", query, outlet.name),
                url: format!("https://{}/article/example", outlet.domain),
                source: outlet.name.to_string(),
                item_type: ItemType::Article,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl CandidateSource for StaticCatalog {
    async fn fetch(
        &self,
        query: &str,
        content_type: ContentType,
        language: Language,
    ) -> AppResult<Vec<CandidateItem>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation(
                "Search query cannot be empty".to_string(),
            ));
        }

        let mut results = Vec::new();
        if content_type.includes_books() {
            results.extend(self.search_books(query));
        }
        if content_type.includes_articles() {
            results.extend(self.search_articles(query, language));
        }

        tracing::info!(
            query = %query,
            content_type = %content_type,
            language = %language,
            results = results.len(),
            source = self.name(),
            "Candidate search completed"
        );

        Ok(results)
    }

    fn name(&self) -> &'static str {
        "static_catalog"
    }
}
